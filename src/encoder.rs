//! Document to ATON text.

use std::borrow::Cow;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace};

use crate::compression::{serialized_size, CompressionEngine, CompressionMode, Dictionary};
use crate::config::EncoderConfig;
use crate::error::{AtonError, AtonResult};
use crate::format;
use crate::query;
use crate::schema::TableLayout;
use crate::value::{kind_name, Document, Record, Value};

/// Size and timing figures for one encode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionStats {
    /// Compact JSON length of the input, in bytes.
    pub original_size: usize,
    /// Length of the ATON output, in bytes.
    pub compressed_size: usize,
    /// `compressed_size / original_size`; lower is better.
    pub compression_ratio: f64,
    pub encoding_time_ms: f64,
    pub mode: CompressionMode,
    pub dictionary_size: usize,
}

/// Encodes documents according to an [`EncoderConfig`].
#[derive(Debug, Clone)]
pub struct Encoder {
    config: EncoderConfig,
    engine: CompressionEngine,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        let engine = CompressionEngine::with_dictionary(config.compression, config.dictionary.into());
        Self { config, engine }
    }

    /// Default configuration with the given compression mode.
    pub fn with_mode(mode: CompressionMode) -> Self {
        Self::new(EncoderConfig::builder().compression(mode).build())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode with compression enabled.
    pub fn encode(&self, document: &Document) -> AtonResult<String> {
        self.encode_with_compression(document, true)
    }

    /// Encode, optionally skipping the compression engine.
    pub fn encode_with_compression(&self, document: &Document, compress: bool) -> AtonResult<String> {
        self.encode_inner(document, compress).map(|(text, _)| text)
    }

    /// Run `query` against the document and encode only the matching rows,
    /// prefixed with an `@query[...]` line.
    ///
    /// Any failure is reported as a query error carrying the original cause.
    pub fn encode_with_query(&self, document: &Document, query: &str) -> AtonResult<String> {
        self.filter_and_encode(document, query)
            .map(|encoded| format!("@query[{}]\n\n{}", query, encoded))
            .map_err(|e| AtonError::Query {
                message: format!("Query encoding failed: {}", e),
                source: Some(Box::new(e)),
            })
    }

    fn filter_and_encode(&self, document: &Document, query_text: &str) -> AtonResult<String> {
        let parsed = query::parse(query_text)?;
        let rows = query::execute(document, &parsed)?;
        debug!(table = %parsed.table, rows = rows.len(), "query filtered table");

        let filtered = Document::from_iter([(
            parsed.table.clone(),
            Value::Array(rows.into_iter().map(Value::Object).collect()),
        )]);
        self.encode(&filtered)
    }

    /// Encode and report size statistics.
    pub fn encode_with_stats(&self, document: &Document) -> AtonResult<(String, CompressionStats)> {
        let start = Instant::now();
        let (text, dictionary_size) = self.encode_inner(document, true)?;
        let encoding_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let original_size = serialized_size(document);
        let compressed_size = text.len();
        let compression_ratio = if original_size == 0 {
            0.0
        } else {
            compressed_size as f64 / original_size as f64
        };

        let stats = CompressionStats {
            original_size,
            compressed_size,
            compression_ratio,
            encoding_time_ms,
            mode: self.config.compression,
            dictionary_size,
        };
        Ok((text, stats))
    }

    fn encode_inner(&self, document: &Document, compress: bool) -> AtonResult<(String, usize)> {
        if self.config.validate {
            validate(document)?;
        }

        let (data, dictionary): (Cow<'_, Document>, Dictionary) =
            if compress && self.config.compression != CompressionMode::Fast {
                let (compressed, metadata) = self.engine.compress(document);
                (Cow::Owned(compressed), metadata.dictionary())
            } else {
                (Cow::Borrowed(document), Dictionary::new())
            };

        let mut parts: Vec<String> = Vec::new();
        if !dictionary.is_empty() {
            parts.push(format::format_dictionary(&dictionary));
            parts.push(String::new());
        }

        for (name, value) in data.iter() {
            let Value::Array(items) = value else {
                trace!(table = %name, "skipping non-list value");
                continue;
            };
            let records: Vec<&Record> = items.iter().filter_map(Value::as_object).collect();
            self.encode_table(name, &records, &dictionary, &mut parts);
        }

        debug!(
            tables = data.len(),
            dictionary = dictionary.len(),
            mode = %self.config.compression,
            "encoded document"
        );
        Ok((parts.join("\n"), dictionary.len()))
    }

    fn encode_table(
        &self,
        name: &str,
        records: &[&Record],
        dictionary: &Dictionary,
        parts: &mut Vec<String>,
    ) {
        let layout = TableLayout::infer(records, self.config.optimize);

        parts.push(format::format_schema(&layout.schema));
        if !layout.defaults.is_empty() {
            parts.push(format::format_defaults(&layout.defaults, dictionary));
        }
        if self.config.queryable {
            parts.push(format!("@queryable[{}]", name));
        }

        parts.push(format!("\n{}", format::format_table_header(name, records.len(), false)));
        for record in records {
            parts.push(format!(
                "{}{}",
                format::ROW_INDENT,
                format::format_row(record, &layout, dictionary)
            ));
        }

        trace!(table = %name, rows = records.len(), defaults = layout.defaults.len(), "encoded table");
    }
}

/// Check that every table is a list of records.
pub fn validate(document: &Document) -> AtonResult<()> {
    for (name, value) in document {
        let Value::Array(items) = value else {
            return Err(AtonError::Encoding(format!(
                "Table '{}' must be a list of records",
                name
            )));
        };
        for (i, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(AtonError::Encoding(format!(
                    "Record {} in table '{}' must be a dictionary, found {}",
                    i,
                    name,
                    kind_name(item)
                )));
            }
        }
    }
    Ok(())
}
