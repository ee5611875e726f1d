//! Chunked encoding of one large table.
//!
//! The first chunk carries the schema, the defaults and a `name(n):`
//! header. Every later chunk carries only a `name+(n):` continuation
//! header and its rows, so the chunks joined with newlines decode to the
//! whole table.

use serde::Serialize;
use tracing::trace;

use crate::compression::Dictionary;
use crate::error::{AtonError, AtonResult};
use crate::format;
use crate::schema::{Defaults, Schema, TableLayout};
use crate::value::{kind_name, Document, Record, Value};

/// Bookkeeping attached to every chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    pub table: String,
    pub records_in_chunk: usize,
    pub start_idx: usize,
    /// Exclusive.
    pub end_idx: usize,
    pub total_records: usize,
    /// `(chunk_id + 1) / total_chunks`
    pub progress: f64,
}

/// One piece of a streamed table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamChunk {
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub data: String,
    pub is_first: bool,
    pub is_last: bool,
    pub metadata: ChunkMetadata,
    /// Only on the first chunk.
    pub schema: Option<Schema>,
    /// Only on the first chunk.
    pub defaults: Option<Defaults>,
}

/// Splits a table into chunks of at most `chunk_size` records.
#[derive(Debug, Clone, Copy)]
pub struct StreamEncoder {
    chunk_size: usize,
    optimize: bool,
}

impl StreamEncoder {
    pub fn new(chunk_size: usize) -> AtonResult<Self> {
        if chunk_size == 0 {
            return Err(AtonError::Config("chunk_size must be at least 1".to_string()));
        }
        Ok(Self {
            chunk_size,
            optimize: true,
        })
    }

    /// Enable or disable default elision.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Stream one table of `document`.
    ///
    /// `table` may be omitted only when the document holds exactly one
    /// table. Chunks are produced lazily; clone the iterator to replay it.
    pub fn stream_encode<'d>(
        &self,
        document: &'d Document,
        table: Option<&str>,
    ) -> AtonResult<ChunkIter<'d>> {
        if document.is_empty() {
            return Err(AtonError::Encoding("Empty data provided".to_string()));
        }

        let (name, value) = match table {
            Some(name) => document
                .iter()
                .find(|(key, _)| key.as_str() == name)
                .ok_or_else(|| AtonError::Encoding(format!("Table '{}' not found", name)))?,
            None if document.len() == 1 => document
                .iter()
                .next()
                .ok_or_else(|| AtonError::Encoding("Empty data provided".to_string()))?,
            None => {
                return Err(AtonError::Encoding(
                    "Multiple tables found, specify table_name".to_string(),
                ));
            }
        };

        let Value::Array(items) = value else {
            return Err(AtonError::Encoding(format!("Table '{}' must be a list", name)));
        };

        let records = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_object().ok_or_else(|| {
                    AtonError::Encoding(format!(
                        "Record {} in table '{}' must be a dictionary, found {}",
                        i,
                        name,
                        kind_name(item)
                    ))
                })
            })
            .collect::<AtonResult<Vec<&Record>>>()?;

        let layout = TableLayout::infer(&records, self.optimize);
        let total_chunks = records.len().div_ceil(self.chunk_size);

        Ok(ChunkIter {
            table: name.as_str(),
            records,
            layout,
            chunk_size: self.chunk_size,
            total_chunks,
            next_chunk: 0,
        })
    }
}

/// Lazy chunk sequence returned by [`StreamEncoder::stream_encode`].
#[derive(Debug, Clone)]
pub struct ChunkIter<'d> {
    table: &'d str,
    records: Vec<&'d Record>,
    layout: TableLayout,
    chunk_size: usize,
    total_chunks: usize,
    next_chunk: usize,
}

impl<'d> ChunkIter<'d> {
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    fn build_chunk(&self, chunk_id: usize) -> StreamChunk {
        let total_records = self.records.len();
        let start_idx = chunk_id * self.chunk_size;
        let end_idx = (start_idx + self.chunk_size).min(total_records);
        let rows = &self.records[start_idx..end_idx];
        let is_first = chunk_id == 0;
        let no_refs = Dictionary::new();

        let mut lines = Vec::with_capacity(rows.len() + 3);
        if is_first {
            lines.push(format::format_schema(&self.layout.schema));
            if !self.layout.defaults.is_empty() {
                lines.push(format::format_defaults(&self.layout.defaults, &no_refs));
            }
        }
        lines.push(format!(
            "\n{}",
            format::format_table_header(self.table, rows.len(), !is_first)
        ));
        for record in rows {
            lines.push(format!(
                "{}{}",
                format::ROW_INDENT,
                format::format_row(record, &self.layout, &no_refs)
            ));
        }

        trace!(table = self.table, chunk_id, rows = rows.len(), "emitting chunk");
        StreamChunk {
            chunk_id,
            total_chunks: self.total_chunks,
            data: lines.join("\n"),
            is_first,
            is_last: chunk_id + 1 == self.total_chunks,
            metadata: ChunkMetadata {
                table: self.table.to_string(),
                records_in_chunk: rows.len(),
                start_idx,
                end_idx,
                total_records,
                progress: (chunk_id + 1) as f64 / self.total_chunks as f64,
            },
            schema: is_first.then(|| self.layout.schema.clone()),
            defaults: is_first.then(|| self.layout.defaults.clone()),
        }
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = StreamChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_chunk >= self.total_chunks {
            return None;
        }
        let chunk = self.build_chunk(self.next_chunk);
        self.next_chunk += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_chunks - self.next_chunk;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIter<'_> {}
