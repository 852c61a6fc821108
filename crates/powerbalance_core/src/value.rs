//! Typed parameter values and the nested documents they are read from.
//!
//! Parameter files are TOML documents whose leaves are scalars or arrays.
//! [`ParamValue`] is the leaf type shared by the parameter set, sweep
//! specifications and the engine seam; [`ParamNode`] is one level of a
//! nested document before flattening.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A single parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Tuple(Vec<ParamValue>),
}

/// A nested parameter document keyed by section name
pub type ParamTable = IndexMap<String, ParamNode>;

/// One node of a nested parameter document
#[derive(Debug, Clone, PartialEq)]
pub enum ParamNode {
    Value(ParamValue),
    Table(ParamTable),
}

impl ParamValue {
    /// Short name of the variant, used when checking sweep homogeneity
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
            ParamValue::List(_) => "list",
            ParamValue::Tuple(_) => "tuple",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) | ParamValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// True for empty strings and empty sequences
    pub fn is_empty(&self) -> bool {
        match self {
            ParamValue::Str(s) => s.is_empty(),
            ParamValue::List(items) | ParamValue::Tuple(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Normalise a value read from a loosely typed source.
    ///
    /// Strings holding an integer, a decimal number or a boolean literal are
    /// converted to the matching variant. Sequences are coerced element-wise
    /// and keep their list/tuple distinction. Everything else passes through.
    pub fn coerce(&self) -> ParamValue {
        match self {
            ParamValue::Str(s) => coerce_str(s),
            ParamValue::List(items) => ParamValue::List(items.iter().map(Self::coerce).collect()),
            ParamValue::Tuple(items) => {
                ParamValue::Tuple(items.iter().map(Self::coerce).collect())
            }
            other => other.clone(),
        }
    }

    /// Compare the textual forms of two values, ignoring case.
    ///
    /// Numbers compare numerically so that an engine reporting `10.0` for an
    /// integer parameter of `10` is not flagged as a mismatch.
    pub fn loosely_eq(&self, other: &ParamValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => float_cmp::approx_eq!(f64, a, b, ulps = 4),
            _ => self.to_string().eq_ignore_ascii_case(&other.to_string()),
        }
    }

    /// Render the value as a Modelica literal
    pub fn to_modelica_literal(&self) -> String {
        match self {
            ParamValue::Str(s) => format!("\"{s}\""),
            ParamValue::List(items) | ParamValue::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_modelica_literal).collect();
                format!("{{{}}}", inner.join(", "))
            }
            other => other.to_string(),
        }
    }
}

fn coerce_str(s: &str) -> ParamValue {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return ParamValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return ParamValue::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return ParamValue::Int(i);
    }
    if trimmed.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(f) = trimmed.parse::<f64>() {
            return ParamValue::Float(f);
        }
    }
    ParamValue::Str(s.to_string())
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part on whole floats ("10.0", not "10")
            ParamValue::Float(v) => write!(f, "{v:?}"),
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::List(items) => {
                let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            ParamValue::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", inner.join(", "))
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<ParamValue> for ParamNode {
    fn from(value: ParamValue) -> Self {
        ParamNode::Value(value)
    }
}

// ============================================================================
// Serde
// ============================================================================

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::Float(f) => serializer.serialize_f64(*f),
            ParamValue::Str(s) => serializer.serialize_str(s),
            ParamValue::List(items) | ParamValue::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl Serialize for ParamNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamNode::Value(value) => value.serialize(serializer),
            ParamNode::Table(table) => {
                let mut map = serializer.serialize_map(Some(table.len()))?;
                for (key, node) in table {
                    map.serialize_entry(key, node)?;
                }
                map.end()
            }
        }
    }
}

struct ParamValueVisitor;

impl<'de> Visitor<'de> for ParamValueVisitor {
    type Value = ParamValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number, string or array")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(ParamValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(ParamValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(i64::try_from(v)
            .map(ParamValue::Int)
            .unwrap_or(ParamValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(ParamValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(ParamValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(ParamValue::Str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<ParamValue>()? {
            items.push(item);
        }
        Ok(ParamValue::List(items))
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamValueVisitor)
    }
}

struct ParamNodeVisitor;

impl<'de> Visitor<'de> for ParamNodeVisitor {
    type Value = ParamNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a parameter value or a table of parameters")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        ParamValueVisitor.visit_bool(v).map(ParamNode::Value)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        ParamValueVisitor.visit_i64(v).map(ParamNode::Value)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        ParamValueVisitor.visit_u64(v).map(ParamNode::Value)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        ParamValueVisitor.visit_f64(v).map(ParamNode::Value)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        ParamValueVisitor.visit_str(v).map(ParamNode::Value)
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        ParamValueVisitor.visit_string(v).map(ParamNode::Value)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        ParamValueVisitor.visit_seq(seq).map(ParamNode::Value)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut table = ParamTable::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, node)) = map.next_entry::<String, ParamNode>()? {
            table.insert(key, node);
        }
        Ok(ParamNode::Table(table))
    }
}

impl<'de> Deserialize<'de> for ParamNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParamNodeVisitor)
    }
}
