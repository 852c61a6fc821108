//! Structural parameters fix the shape of a model (array sizes, component
//! counts) and cannot change after compilation. They are applied by
//! rewriting the Modelica source before it is handed to the engine.
//!
//! Only lines carrying the [`STRUCTURAL_MARKER`] are considered. On such a
//! line the right-hand side of the binding `=` is replaced by the configured
//! value.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::environment::Environment;
use crate::error::ParameterError;
use crate::parameters::ParameterSet;
use crate::value::ParamValue;

/// Annotation identifying a structural parameter declaration
pub const STRUCTURAL_MARKER: &str = "STRUCTURAL_PARAMETER";

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True when `ident` occurs in `line` as a whole identifier
fn contains_identifier(line: &str, ident: &str) -> bool {
    if ident.is_empty() {
        return false;
    }
    line.match_indices(ident).any(|(start, _)| {
        let before = line[..start].chars().next_back();
        let after = line[start + ident.len()..].chars().next();
        !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
    })
}

/// Byte offset of the binding `=`, skipping any inside a modifier such as
/// `(unit="m")`
fn binding_offset(line: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            '=' if !in_string && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Rewrite the marked declarations of one source file.
///
/// Returns the new text and the number of declarations replaced.
pub fn substitute_structural_parameters(
    source: &str,
    substitutions: &IndexMap<String, ParamValue>,
) -> (String, usize) {
    let mut replaced = 0;
    let mut output = String::with_capacity(source.len());

    for line in source.split_inclusive('\n') {
        let content = line.trim_end_matches(['\r', '\n']);
        let ending = &line[content.len()..];

        let rewritten = if content.contains(STRUCTURAL_MARKER) {
            substitutions
                .iter()
                .find(|(name, _)| contains_identifier(content, name))
                .and_then(|(_, value)| {
                    binding_offset(content).map(|offset| {
                        format!("{}= {};", &content[..offset], value.to_modelica_literal())
                    })
                })
        } else {
            None
        };

        match rewritten {
            Some(new_line) => {
                replaced += 1;
                output.push_str(&new_line);
                output.push_str(ending);
            }
            None => output.push_str(line),
        }
    }

    (output, replaced)
}

impl ParameterSet {
    /// Structural values configured for a Modelica file, matched on its stem
    fn structural_values_for(&self, file: &Path) -> Option<&IndexMap<String, ParamValue>> {
        let stem = file.file_stem()?.to_str()?;
        self.structural_parameters
            .iter()
            .find(|(model, _)| model.eq_ignore_ascii_case(stem))
            .map(|(_, values)| values)
    }

    /// Write `file` into `out_dir`, substituting structural values when any
    /// are configured for it. Returns whether the file was rewritten.
    fn perform_struct_subs(&self, file: &Path, out_dir: &Path) -> Result<bool, ParameterError> {
        let file_name = file
            .file_name()
            .ok_or_else(|| ParameterError::InvalidInput(format!("'{}' is not a file", file.display())))?;
        let target = out_dir.join(file_name);

        match self.structural_values_for(file) {
            Some(values) => {
                let source = fs::read_to_string(file)?;
                let (text, replaced) = substitute_structural_parameters(&source, values);
                fs::write(&target, text)?;
                tracing::debug!(
                    "substituted {replaced} structural parameters in {}",
                    file.display()
                );
                Ok(true)
            }
            None => {
                fs::copy(file, &target)?;
                Ok(false)
            }
        }
    }

    /// Produce rewritten copies of a model file and its dependencies.
    ///
    /// Returns `None` without touching the filesystem when no structural
    /// parameters are configured, or when none of the files needed rewriting.
    /// Otherwise returns the path of the rewritten primary file inside a
    /// scratch directory owned by `environment`.
    pub fn set_struct_parameters(
        &self,
        environment: &mut Environment,
        model_file: &Path,
        dependencies: &[PathBuf],
    ) -> Result<Option<PathBuf>, ParameterError> {
        let mut files = std::iter::once(model_file).chain(dependencies.iter().map(PathBuf::as_path));
        if !files.any(|file| self.structural_values_for(file).is_some()) {
            return Ok(None);
        }

        let out_dir = environment.scratch_dir("pbm_structural_")?;
        self.perform_struct_subs(model_file, &out_dir)?;
        for dependency in dependencies {
            self.perform_struct_subs(dependency, &out_dir)?;
        }

        Ok(model_file.file_name().map(|name| out_dir.join(name)))
    }
}
