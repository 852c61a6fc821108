//! Conversion between nested parameter documents and flat dotted maps

use indexmap::IndexMap;

use crate::value::{ParamNode, ParamTable, ParamValue};

/// Separator joining the segments of a flattened parameter name
pub const SEPARATOR: &str = ".";

/// Flatten a nested document into `a.b.c -> value` entries.
///
/// Keys are visited in document order so the flat map keeps the layout of
/// the source file.
pub fn flatten_dictionary(input: &ParamTable) -> IndexMap<String, ParamValue> {
    let mut output = IndexMap::new();
    flatten_into(input, None, &mut output);
    output
}

fn flatten_into(table: &ParamTable, prefix: Option<&str>, output: &mut IndexMap<String, ParamValue>) {
    for (key, node) in table {
        let label = match prefix {
            Some(prefix) => format!("{prefix}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match node {
            ParamNode::Value(value) => {
                output.insert(label, value.clone());
            }
            ParamNode::Table(inner) => flatten_into(inner, Some(&label), output),
        }
    }
}

/// Expand dotted names back into a nested document.
///
/// A leaf that collides with a branch of the same name is replaced by the
/// branch.
pub fn expand_dictionary(input: &IndexMap<String, ParamValue>) -> ParamTable {
    let mut output = ParamTable::new();
    for (label, value) in input {
        let segments: Vec<&str> = label.split(SEPARATOR).collect();
        insert_path(&mut output, &segments, value.clone());
    }
    output
}

fn insert_path(table: &mut ParamTable, segments: &[&str], value: ParamValue) {
    match segments {
        [] => {}
        [leaf] => {
            table.insert((*leaf).to_string(), ParamNode::Value(value));
        }
        [head, rest @ ..] => {
            let entry = table
                .entry((*head).to_string())
                .or_insert_with(|| ParamNode::Table(ParamTable::new()));
            if matches!(*entry, ParamNode::Value(_)) {
                *entry = ParamNode::Table(ParamTable::new());
            }
            if let ParamNode::Table(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}
