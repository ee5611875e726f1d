//! Compression algorithms.
//!
//! Every algorithm is a pure transformation: it returns a rewritten copy of
//! the document plus the metadata describing the rewrite, and leaves the
//! input untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::value::{Document, Value};

/// Reference token (`#0`, `#1`, ...) to the literal string it stands for.
pub type Dictionary = BTreeMap<String, String>;

/// What a compression pass did. Later stages overwrite fields they set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<Dictionary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<BTreeMap<String, Value>>,
    /// Names of the algorithms applied, in order.
    pub applied: Vec<&'static str>,
    pub encoding_time_ms: f64,
}

impl CompressionMetadata {
    /// Shallow merge: every field `other` sets replaces ours.
    pub fn merge(&mut self, other: CompressionMetadata) {
        if other.dictionary.is_some() {
            self.dictionary = other.dictionary;
        }
        if other.delta_fields.is_some() {
            self.delta_fields = other.delta_fields;
        }
        if other.patterns.is_some() {
            self.patterns = other.patterns;
        }
        self.applied.extend(other.applied);
    }

    /// The dictionary, or an empty one when no dictionary stage ran.
    pub fn dictionary(&self) -> Dictionary {
        self.dictionary.clone().unwrap_or_default()
    }
}

/// A document-level compression stage.
pub trait CompressionAlgorithm {
    fn name(&self) -> &'static str;

    /// Rewrite `document`, returning the new document and its metadata.
    fn compress(&self, document: &Document) -> (Document, CompressionMetadata);

    /// Estimated fraction of bytes saved, in `[0, 1]`, without rewriting anything.
    fn estimate_savings(&self, document: &Document) -> f64;
}

/// Replaces frequent long strings with `#N` reference tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryCompression {
    pub min_length: usize,
    pub min_occurrences: usize,
}

impl Default for DictionaryCompression {
    fn default() -> Self {
        Self {
            min_length: 5,
            min_occurrences: 3,
        }
    }
}

impl DictionaryCompression {
    pub fn new(min_length: usize, min_occurrences: usize) -> Self {
        Self {
            min_length,
            min_occurrences,
        }
    }

    /// String occurrence counts, in first-seen order.
    fn count_strings<'a>(&self, document: &'a Document) -> Vec<(&'a str, usize)> {
        let mut order: Vec<&'a str> = Vec::new();
        let mut counts: HashMap<&'a str, usize> = HashMap::new();
        for value in document.values() {
            collect_strings(value, &mut |s| {
                let count = counts.entry(s).or_insert(0);
                if *count == 0 {
                    order.push(s);
                }
                *count += 1;
            });
        }
        order.into_iter().map(|s| (s, counts[s])).collect()
    }

    fn qualifies(&self, s: &str, count: usize) -> bool {
        s.chars().count() >= self.min_length && count >= self.min_occurrences
    }

    /// Build the dictionary for `document` without rewriting it.
    ///
    /// Reference tokens that already occur as literal strings in the
    /// document are skipped, so a reference never shadows real data.
    pub fn build_dictionary(&self, document: &Document) -> Dictionary {
        let counts = self.count_strings(document);
        let taken: HashSet<&str> = counts
            .iter()
            .map(|(s, _)| *s)
            .filter(|s| s.starts_with('#'))
            .collect();

        let mut next = 0usize;
        let mut dictionary = Dictionary::new();
        for (s, count) in counts {
            if !self.qualifies(s, count) || s.starts_with('#') {
                continue;
            }
            let reference = loop {
                let candidate = format!("#{}", next);
                next += 1;
                if !taken.contains(candidate.as_str()) {
                    break candidate;
                }
            };
            dictionary.insert(reference, s.to_string());
        }
        dictionary
    }
}

impl CompressionAlgorithm for DictionaryCompression {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    fn compress(&self, document: &Document) -> (Document, CompressionMetadata) {
        let dictionary = self.build_dictionary(document);
        let reverse: HashMap<&str, &str> = dictionary
            .iter()
            .map(|(reference, literal)| (literal.as_str(), reference.as_str()))
            .collect();

        let compressed = document
            .iter()
            .map(|(name, value)| (name.clone(), replace_strings(value, &reverse)))
            .collect();

        let metadata = CompressionMetadata {
            dictionary: Some(dictionary),
            applied: vec![self.name()],
            ..Default::default()
        };
        (compressed, metadata)
    }

    fn estimate_savings(&self, document: &Document) -> f64 {
        let counts = self.count_strings(document);
        let total: usize = counts
            .iter()
            .map(|(s, count)| s.chars().count() * count)
            .sum();
        if total == 0 {
            return 0.0;
        }

        let saved: usize = counts
            .iter()
            .filter(|(s, count)| self.qualifies(s, *count))
            .map(|(s, count)| s.chars().count().saturating_sub(3) * count.saturating_sub(1))
            .sum();
        saved as f64 / total as f64
    }
}

fn collect_strings<'a>(value: &'a Value, sink: &mut impl FnMut(&'a str)) {
    match value {
        Value::String(s) => sink(s),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, sink)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, sink)),
        _ => {}
    }
}

fn replace_strings(value: &Value, reverse: &HashMap<&str, &str>) -> Value {
    match value {
        Value::String(s) => match reverse.get(s.as_str()) {
            Some(reference) => Value::String((*reference).to_string()),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| replace_strings(v, reverse)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), replace_strings(v, reverse)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Delta encoding for numeric sequences.
///
/// The rewrite is a pass-through: no field is delta-encoded, so the wire
/// format never carries deltas. Only the estimator is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaCompression;

impl DeltaCompression {
    /// Arrays of numbers held directly by an object field, anywhere in the document.
    fn numeric_sequences(document: &Document) -> Vec<Vec<f64>> {
        let mut sequences = Vec::new();
        for value in document.values() {
            find_sequences_in_field(value, &mut sequences);
        }
        sequences
    }
}

fn find_sequences_in_field(value: &Value, out: &mut Vec<Vec<f64>>) {
    if let Value::Array(items) = value {
        if items.iter().all(Value::is_number) {
            out.push(items.iter().filter_map(Value::as_f64).collect());
            return;
        }
    }
    find_sequences(value, out);
}

fn find_sequences(value: &Value, out: &mut Vec<Vec<f64>>) {
    match value {
        Value::Object(map) => map.values().for_each(|v| find_sequences_in_field(v, out)),
        Value::Array(items) => items.iter().for_each(|v| find_sequences(v, out)),
        _ => {}
    }
}

impl CompressionAlgorithm for DeltaCompression {
    fn name(&self) -> &'static str {
        "delta"
    }

    fn compress(&self, document: &Document) -> (Document, CompressionMetadata) {
        let metadata = CompressionMetadata {
            delta_fields: Some(Vec::new()),
            applied: vec![self.name()],
            ..Default::default()
        };
        (document.clone(), metadata)
    }

    fn estimate_savings(&self, document: &Document) -> f64 {
        let mut saved = 0usize;
        let mut total = 0usize;

        for seq in Self::numeric_sequences(document) {
            if seq.len() < 2 {
                continue;
            }
            let deltas: Vec<f64> = seq.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
            let avg_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
            let avg_value = seq.iter().map(|v| v.abs()).sum::<f64>() / seq.len() as f64;

            if avg_delta < avg_value * 0.5 {
                saved += seq.len() - 1;
                total += seq.len();
            }
        }

        if total == 0 {
            0.0
        } else {
            saved as f64 / total as f64
        }
    }
}

/// Pattern-based compression for structured data.
///
/// Pattern detection finds nothing yet, so compress is a pass-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternCompression;

impl PatternCompression {
    fn identify_patterns(&self, _document: &Document) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

impl CompressionAlgorithm for PatternCompression {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn compress(&self, document: &Document) -> (Document, CompressionMetadata) {
        let metadata = CompressionMetadata {
            patterns: Some(self.identify_patterns(document)),
            applied: vec![self.name()],
            ..Default::default()
        };
        (document.clone(), metadata)
    }

    fn estimate_savings(&self, document: &Document) -> f64 {
        self.identify_patterns(document).len() as f64 * 0.05
    }
}
