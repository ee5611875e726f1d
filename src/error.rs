//! Error types for ATON.

use thiserror::Error;

/// The main error type for ATON operations.
#[derive(Debug, Error)]
pub enum AtonError {
    /// The input document does not have the table-of-records shape.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Any failure while scanning or parsing an encoded document.
    #[error("Decode failed: {message}")]
    Decoding {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query tokenizing, parsing or execution failed.
    #[error("Query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<Box<AtonError>>,
    },

    /// Reserved for compression-stage faults.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AtonError {
    /// Create a query error without a position.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query error at the given input position.
    pub fn query_at(position: usize, message: impl Into<String>) -> Self {
        Self::Query {
            message: format!("at position {}: {}", position, message.into()),
            source: None,
        }
    }

    /// Create a decoding error with no underlying cause.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any error as the cause of a decoding failure.
    pub fn decoding_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Decoding {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// True for the `Query` kind.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}

/// Result type alias for ATON operations.
pub type AtonResult<T> = Result<T, AtonError>;
