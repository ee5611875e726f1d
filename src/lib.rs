//! # ATON: Adaptive Token-Oriented Notation
//!
//! > **Tables in, tokens out.**
//!
//! ATON turns a document of tables into compact text: one schema line per
//! table, inferred defaults that are left out of rows, and a dictionary of
//! frequent strings. An SQL-like query language filters tables in memory.
//!
//! ## Quick Example
//!
//! ```rust
//! use serde_json::json;
//!
//! let doc = json!({
//!     "employees": [
//!         {"id": 1, "name": "Alice", "active": true},
//!         {"id": 2, "name": "Bob", "active": true}
//!     ]
//! });
//! let doc = doc.as_object().unwrap();
//!
//! let text = aton::encode(doc).unwrap();
//! assert!(text.contains("@schema[id:int, name:str, active:bool]"));
//! assert_eq!(&aton::decode(&text).unwrap(), doc);
//!
//! let query = aton::parse("employees WHERE name LIKE 'A%'").unwrap();
//! let rows = aton::query::execute(doc, &query).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```
//!
//! ## Directives
//!
//! | Line              | Meaning                              |
//! |-------------------|--------------------------------------|
//! | `@dict[...]`      | Reference token to string            |
//! | `@schema[...]`    | Column names and type tags           |
//! | `@defaults[...]`  | Values elided from rows              |
//! | `@query[...]`     | Query attached to the document       |
//! | `name(n):`        | Table header followed by `n` rows    |
//! | `name+(n):`       | Continuation of a streamed table     |

pub mod compression;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod query;
pub mod schema;
pub mod stream;
pub mod value;

pub mod prelude {
    pub use crate::compression::{CompressionEngine, CompressionMode};
    pub use crate::config::EncoderConfig;
    pub use crate::decoder::Decoder;
    pub use crate::encoder::{CompressionStats, Encoder};
    pub use crate::error::*;
    pub use crate::query::{ParsedQuery, QueryEngine};
    pub use crate::stream::{StreamChunk, StreamEncoder};
    pub use crate::value::{Document, Record, TypeTag, Value};
}

/// Encode a document with the default configuration.
pub fn encode(document: &value::Document) -> error::AtonResult<String> {
    encoder::Encoder::default().encode(document)
}

/// Decode ATON text into a document.
///
/// # Example
///
/// ```
/// let doc = aton::decode("@schema[id:int]\n\nt(2):\n  1\n  2").unwrap();
/// assert_eq!(doc["t"][1]["id"], 2);
/// ```
pub fn decode(text: &str) -> error::AtonResult<value::Document> {
    decoder::Decoder::new().decode(text)
}

/// Parse a query string.
///
/// # Example
///
/// ```
/// let q = aton::parse("users SELECT id WHERE age >= 18 LIMIT 5").unwrap();
/// assert_eq!(q.table, "users");
/// assert_eq!(q.limit, Some(5));
/// ```
pub fn parse(query: &str) -> error::AtonResult<query::ParsedQuery> {
    query::parse(query)
}
