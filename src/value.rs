//! Value model and type tags.
//!
//! Records are ordered `serde_json` maps (built with `preserve_order`), so a
//! record's field order is its insertion order. A [`Document`] maps table
//! names to values; only array-valued entries are tables.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
pub use serde_json::{Map, Number, Value};

use crate::error::AtonError;

/// One row: field name to value, in insertion order.
pub type Record = Map<String, Value>;

/// Top-level document: table name to (usually) a list of records.
pub type Document = Map<String, Value>;

/// Column type inferred from a value's runtime shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Int,
    Float,
    Str,
    Bool,
    Null,
    Array,
    Object,
}

impl TypeTag {
    /// Infer the tag for a single value.
    ///
    /// Booleans are checked before numbers, and a number is `int` whenever
    /// it is stored as an integer.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => TypeTag::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => TypeTag::Int,
            Value::Number(_) => TypeTag::Float,
            Value::String(_) => TypeTag::Str,
            Value::Null => TypeTag::Null,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) => TypeTag::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Bool => "bool",
            TypeTag::Null => "null",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = AtonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(TypeTag::Int),
            "float" => Ok(TypeTag::Float),
            "str" => Ok(TypeTag::Str),
            "bool" => Ok(TypeTag::Bool),
            "null" => Ok(TypeTag::Null),
            "array" => Ok(TypeTag::Array),
            "object" => Ok(TypeTag::Object),
            other => Err(AtonError::decoding(format!("unknown type tag '{}'", other))),
        }
    }
}

/// True for null, bool, number and string values.
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Query equality: numbers compare by numeric value, everything else must
/// match in type and content.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Native ordering between two values, or `None` when the pair has no
/// ordering (mixed types, null, arrays, objects).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Short type name used in error messages.
pub fn kind_name(value: &Value) -> &'static str {
    TypeTag::of(value).as_str()
}
