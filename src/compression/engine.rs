//! Compression mode dispatch.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::algorithms::*;
use crate::error::AtonError;
use crate::value::Document;

/// Serialized size below which ADAPTIVE behaves like FAST.
pub const ADAPTIVE_FAST_LIMIT: usize = 1_000;

/// Serialized size below which ADAPTIVE behaves like BALANCED.
pub const ADAPTIVE_BALANCED_LIMIT: usize = 10_000;

/// Compression strategy, fixed when an encoder is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CompressionMode {
    /// Dictionary only. The encoder skips compression entirely in this mode.
    Fast,
    /// Dictionary only.
    #[default]
    Balanced,
    /// Dictionary, then delta, then pattern.
    Ultra,
    /// Picks a strategy from the serialized input size.
    Adaptive,
}

impl CompressionMode {
    pub const ALL: [CompressionMode; 4] = [
        CompressionMode::Fast,
        CompressionMode::Balanced,
        CompressionMode::Ultra,
        CompressionMode::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMode::Fast => "fast",
            CompressionMode::Balanced => "balanced",
            CompressionMode::Ultra => "ultra",
            CompressionMode::Adaptive => "adaptive",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CompressionMode::Fast => "Dictionary compression only",
            CompressionMode::Balanced => "Dictionary + selective algorithms",
            CompressionMode::Ultra => "All compression algorithms",
            CompressionMode::Adaptive => "Size-driven mode selection",
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMode {
    type Err = AtonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(CompressionMode::Fast),
            "balanced" => Ok(CompressionMode::Balanced),
            "ultra" => Ok(CompressionMode::Ultra),
            "adaptive" => Ok(CompressionMode::Adaptive),
            _ => Err(AtonError::Config(format!("Invalid compression mode: {}", s))),
        }
    }
}

impl TryFrom<String> for CompressionMode {
    type Error = AtonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Applies the algorithms selected by a [`CompressionMode`].
#[derive(Debug, Clone)]
pub struct CompressionEngine {
    mode: CompressionMode,
    dictionary: DictionaryCompression,
    delta: DeltaCompression,
    pattern: PatternCompression,
}

impl CompressionEngine {
    pub fn new(mode: CompressionMode) -> Self {
        Self::with_dictionary(mode, DictionaryCompression::default())
    }

    pub fn with_dictionary(mode: CompressionMode, dictionary: DictionaryCompression) -> Self {
        Self {
            mode,
            dictionary,
            delta: DeltaCompression,
            pattern: PatternCompression,
        }
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Algorithms in their fixed application order.
    fn algorithms(&self) -> [&dyn CompressionAlgorithm; 3] {
        [&self.dictionary, &self.delta, &self.pattern]
    }

    /// Compress `document` according to the mode. Timing is always recorded.
    pub fn compress(&self, document: &Document) -> (Document, CompressionMetadata) {
        let start = Instant::now();

        let (compressed, mut metadata) = match self.mode {
            CompressionMode::Fast => self.compress_fast(document),
            CompressionMode::Balanced => self.compress_balanced(document),
            CompressionMode::Ultra => self.compress_ultra(document),
            CompressionMode::Adaptive => self.compress_adaptive(document),
        };

        metadata.encoding_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            mode = %self.mode,
            applied = ?metadata.applied,
            dictionary = metadata.dictionary.as_ref().map_or(0, |d| d.len()),
            "compressed document"
        );
        (compressed, metadata)
    }

    fn compress_fast(&self, document: &Document) -> (Document, CompressionMetadata) {
        self.dictionary.compress(document)
    }

    fn compress_balanced(&self, document: &Document) -> (Document, CompressionMetadata) {
        let mut metadata = CompressionMetadata::default();
        let (compressed, meta) = self.dictionary.compress(document);
        metadata.merge(meta);
        (compressed, metadata)
    }

    fn compress_ultra(&self, document: &Document) -> (Document, CompressionMetadata) {
        let mut metadata = CompressionMetadata::default();
        let mut current = document.clone();
        for algo in self.algorithms() {
            let (next, meta) = algo.compress(&current);
            metadata.merge(meta);
            current = next;
        }
        (current, metadata)
    }

    fn compress_adaptive(&self, document: &Document) -> (Document, CompressionMetadata) {
        let size = serialized_size(document);
        if size < ADAPTIVE_FAST_LIMIT {
            return self.compress_fast(document);
        }
        if size < ADAPTIVE_BALANCED_LIMIT {
            return self.compress_balanced(document);
        }

        // ties keep the earlier algorithm
        let algorithms = self.algorithms();
        let mut best = algorithms[0];
        let mut best_score = best.estimate_savings(document);
        for &algo in &algorithms[1..] {
            let score = algo.estimate_savings(document);
            if score > best_score {
                best = algo;
                best_score = score;
            }
        }
        debug!(size, algorithm = best.name(), score = best_score, "adaptive choice");
        best.compress(document)
    }
}

/// Length of the compact JSON rendering of `document`.
pub fn serialized_size(document: &Document) -> usize {
    serde_json::to_string(document).map_or(0, |s| s.len())
}
