//! ATON text back to a document.

use tracing::{debug, trace};

use crate::compression::Dictionary;
use crate::error::{AtonError, AtonResult};
use crate::format::{self, directive_body, looks_like_header, parse_table_header, split_fields, split_pair};
use crate::schema::{Defaults, Schema};
use crate::value::{Document, Record, TypeTag, Value};

/// Decodes ATON text. Holds no state between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder;

/// Directives seen so far while scanning one input.
#[derive(Debug, Default)]
struct ScanState {
    dictionary: Dictionary,
    schema: Schema,
    defaults: Defaults,
}

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode `text`. Every failure is reported as [`AtonError::Decoding`].
    pub fn decode(&self, text: &str) -> AtonResult<Document> {
        let lines: Vec<&str> = text.lines().collect();
        let mut state = ScanState::default();
        let mut document = Document::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            i += 1;

            if line.is_empty() {
                continue;
            }

            if line.starts_with('@') {
                state.apply_directive(line, i)?;
                continue;
            }

            let Some(header) = parse_table_header(line)? else {
                return Err(AtonError::decoding(format!(
                    "line {}: expected a directive or table header, found '{}'",
                    i, line
                )));
            };

            let mut rows = Vec::with_capacity(header.count);
            while rows.len() < header.count {
                let Some(raw) = lines.get(i) else {
                    return Err(count_mismatch(header.name, header.count, rows.len()));
                };
                let data = raw.trim();
                if looks_like_header(data) {
                    return Err(count_mismatch(header.name, header.count, rows.len()));
                }
                i += 1;
                if data.is_empty() || data.starts_with('@') {
                    continue;
                }
                rows.push(Value::Object(state.parse_row(data)));
            }

            trace!(table = header.name, rows = rows.len(), continuation = header.continuation, "decoded table");
            if header.continuation {
                match document.get_mut(header.name) {
                    Some(Value::Array(existing)) => existing.extend(rows),
                    _ => {
                        document.insert(header.name.to_string(), Value::Array(rows));
                    }
                }
            } else {
                document.insert(header.name.to_string(), Value::Array(rows));
            }
        }

        debug!(tables = document.len(), dictionary = state.dictionary.len(), "decoded document");
        Ok(document)
    }
}

fn count_mismatch(table: &str, expected: usize, found: usize) -> AtonError {
    AtonError::decoding(format!(
        "table '{}' declares {} rows but only {} were found",
        table, expected, found
    ))
}

fn malformed(line_no: usize, what: &str, line: &str) -> AtonError {
    AtonError::decoding(format!("line {}: malformed {} '{}'", line_no, what, line))
}

impl ScanState {
    fn apply_directive(&mut self, line: &str, line_no: usize) -> AtonResult<()> {
        if line.starts_with("@dict") {
            let body = directive_body(line, "@dict").ok_or_else(|| malformed(line_no, "dictionary", line))?;
            self.dictionary = Dictionary::new();
            for entry in split_fields(body) {
                let (reference, literal) =
                    split_pair(&entry).ok_or_else(|| malformed(line_no, "dictionary entry", &entry))?;
                let literal = match format::parse_value(literal, &Dictionary::new()) {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.dictionary.insert(reference.to_string(), literal);
            }
        } else if line.starts_with("@schema") {
            let body = directive_body(line, "@schema").ok_or_else(|| malformed(line_no, "schema", line))?;
            self.schema = split_fields(body)
                .iter()
                .map(|entry| {
                    let (name, tag) =
                        split_pair(entry).ok_or_else(|| malformed(line_no, "schema entry", entry))?;
                    Ok((format::parse_field_name(name), tag.parse::<TypeTag>()?))
                })
                .collect::<AtonResult<Schema>>()?;
            // defaults belong to the schema that precedes them
            self.defaults.clear();
        } else if line.starts_with("@defaults") {
            let body = directive_body(line, "@defaults").ok_or_else(|| malformed(line_no, "defaults", line))?;
            self.defaults = Defaults::new();
            for entry in split_fields(body) {
                let (field, value) =
                    split_pair(&entry).ok_or_else(|| malformed(line_no, "defaults entry", &entry))?;
                self.defaults
                    .insert(format::parse_field_name(field), format::parse_value(value, &self.dictionary));
            }
        } else {
            trace!(line_no, directive = line, "ignoring directive");
        }
        Ok(())
    }

    /// Map row slots onto the schema. Empty slots and missing trailing slots
    /// take the field default; an empty slot without a default is null.
    fn parse_row(&self, line: &str) -> Record {
        let slots = split_fields(line);
        let mut record = Record::new();
        for (idx, (field, _)) in self.schema.iter().enumerate() {
            match slots.get(idx) {
                Some(slot) if !slot.is_empty() => {
                    record.insert(field.clone(), format::parse_value(slot, &self.dictionary));
                }
                Some(_) => {
                    let value = self.defaults.get(field).cloned().unwrap_or(Value::Null);
                    record.insert(field.clone(), value);
                }
                None => {
                    if let Some(value) = self.defaults.get(field) {
                        record.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode(text: &str) -> AtonResult<Document> {
        Decoder::new().decode(text)
    }

    #[test]
    fn test_decode_full_layout() {
        let text = [
            r#"@dict[#0:"Engineering"]"#,
            "",
            "@schema[id:int, name:str, dept:str, active:bool]",
            "@defaults[active:true, dept:#0]",
            "",
            "employees(3):",
            r#"  1, "Alice""#,
            r#"  2, "Bob", "Sales""#,
            r#"  3, "Carol", , false"#,
        ]
        .join("\n");
        let doc = decode(&text).unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({
                "employees": [
                    {"id": 1, "name": "Alice", "dept": "Engineering", "active": true},
                    {"id": 2, "name": "Bob", "dept": "Sales", "active": true},
                    {"id": 3, "name": "Carol", "dept": "Engineering", "active": false}
                ]
            })
        );
    }

    #[test]
    fn test_defaults_do_not_leak_between_tables() {
        let text = "@schema[s:str]\n@defaults[s:\"on\"]\n\na(1):\n  \"on\"\n@schema[s:str, t:int]\n\nb(1):\n  \"x\"";
        let doc = decode(text).unwrap();
        assert_eq!(doc["a"], json!([{"s": "on"}]));
        assert_eq!(doc["b"], json!([{"s": "x"}]));
    }

    #[test]
    fn test_empty_slot_without_default_is_null() {
        let doc = decode("@schema[a:int, b:str, c:int]\n\nt(1):\n  1, , 3").unwrap();
        assert_eq!(doc["t"], json!([{"a": 1, "b": null, "c": 3}]));
    }

    #[test]
    fn test_unknown_reference_kept_raw() {
        let doc = decode("@dict[#0:\"Alpha\"]\n\n@schema[a:str, b:str]\n\nt(1):\n  #0, #7").unwrap();
        assert_eq!(doc["t"], json!([{"a": "Alpha", "b": "#7"}]));
    }

    #[test]
    fn test_continuation_appends() {
        let text = "@schema[id:int]\n\nt(2):\n  1\n  2\n\nt+(1):\n  3";
        let doc = decode(text).unwrap();
        assert_eq!(doc["t"], json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    }

    #[test]
    fn test_query_and_queryable_directives_ignored() {
        let text = "@query[t WHERE id = 1]\n\n@schema[id:int]\n@queryable[t]\n\nt(1):\n  1";
        assert_eq!(decode(text).unwrap()["t"], json!([{"id": 1}]));
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let err = decode("@schema[id:int]\n\nt(3):\n  1\n  2").unwrap_err();
        assert!(matches!(err, AtonError::Decoding { .. }));
        assert!(err.to_string().contains("declares 3 rows"));

        let err = decode("@schema[id:int]\n\nt(2):\n  1\nu(1):\n  2").unwrap_err();
        assert!(matches!(err, AtonError::Decoding { .. }));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(decode("just text"), Err(AtonError::Decoding { .. })));
        assert!(matches!(decode("@schema id:int"), Err(AtonError::Decoding { .. })));
        assert!(matches!(decode("@schema[id:number]"), Err(AtonError::Decoding { .. })));
        assert!(matches!(decode("bad name(2):"), Err(AtonError::Decoding { .. })));
    }

    #[test]
    fn test_oversized_row_count_keeps_cause() {
        let err = decode("@schema[id:int]\n\nt(184467440737095516160):\n  1").unwrap_err();
        assert!(matches!(err, AtonError::Decoding { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(decode("").unwrap().is_empty());
        assert_eq!(decode("@schema[]\n\nt(0):").unwrap()["t"], json!([]));
    }

    #[test]
    fn test_crlf_lines() {
        let doc = decode("@schema[a:str]\r\n\r\nt(1):\r\n  \"x\"\r\n").unwrap();
        assert_eq!(doc["t"], json!([{"a": "x"}]));
    }
}
