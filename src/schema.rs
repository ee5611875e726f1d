//! Schema and default-value inference.
//!
//! The schema of a table comes from its first record only. Defaults come
//! from a majority vote over a sample of the first records.

use std::collections::{BTreeMap, HashMap};

use crate::value::{is_scalar, Record, TypeTag, Value};

/// Number of leading records sampled for default detection.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// A value becomes a default when it occurs in more than this share of the sample.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Ordered `(field, type)` columns of a table.
pub type Schema = Vec<(String, TypeTag)>;

/// Field to default value, kept sorted by field name.
pub type Defaults = BTreeMap<String, Value>;

/// Infer the type tag of a single value.
pub fn infer_type(value: &Value) -> TypeTag {
    TypeTag::of(value)
}

/// Derive the schema from one record's keys and value shapes.
pub fn infer_schema(record: &Record) -> Schema {
    record
        .iter()
        .map(|(name, value)| (name.clone(), infer_type(value)))
        .collect()
}

/// Hashable view of a scalar, used to count equal values.
#[derive(Debug, PartialEq, Eq, Hash)]
enum ScalarKey<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(u64),
    Str(&'a str),
}

impl<'a> ScalarKey<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Null => Some(ScalarKey::Null),
            Value::Bool(b) => Some(ScalarKey::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ScalarKey::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(ScalarKey::UInt(u))
                } else {
                    n.as_f64().map(|f| ScalarKey::Float(f.to_bits()))
                }
            }
            Value::String(s) => Some(ScalarKey::Str(s)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Detect per-field defaults over the first [`DEFAULT_SAMPLE_SIZE`] records.
///
/// Every field seen anywhere in the sample takes part. A field holding any
/// array or object in the sample never gets a default.
pub fn infer_defaults<'a, I>(records: I) -> Defaults
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut field_values: HashMap<&'a str, Vec<&'a Value>> = HashMap::new();
    for record in records.into_iter().take(DEFAULT_SAMPLE_SIZE) {
        for (key, value) in record {
            field_values.entry(key.as_str()).or_default().push(value);
        }
    }

    let mut defaults = Defaults::new();
    for (field, values) in field_values {
        if values.is_empty() || !values.iter().all(|v| is_scalar(v)) {
            continue;
        }

        let mut counts: HashMap<ScalarKey<'a>, (usize, &'a Value)> = HashMap::new();
        for &value in &values {
            if let Some(key) = ScalarKey::of(value) {
                counts.entry(key).or_insert((0, value)).0 += 1;
            }
        }

        if let Some((count, value)) = counts.into_values().max_by_key(|(count, _)| *count) {
            if count as f64 / values.len() as f64 > DEFAULT_THRESHOLD {
                defaults.insert(field.to_string(), value.clone());
            }
        }
    }
    defaults
}

/// Schema plus defaults for one table, computed once per encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableLayout {
    pub schema: Schema,
    pub defaults: Defaults,
}

impl TableLayout {
    /// Infer the layout of `records`. With `optimize` off no defaults are detected.
    pub fn infer(records: &[&Record], optimize: bool) -> Self {
        let Some(first) = records.first() else {
            return Self::default();
        };
        let defaults = if optimize {
            infer_defaults(records.iter().copied())
        } else {
            Defaults::new()
        };
        Self {
            schema: infer_schema(first),
            defaults,
        }
    }

    /// Whether `value` can be left out of a row for `field`.
    pub fn is_default(&self, field: &str, value: &Value) -> bool {
        self.defaults.get(field).is_some_and(|d| d == value)
    }
}
