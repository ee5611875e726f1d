//! The ATON query language.
//!
//! ```text
//! products SELECT id, name WHERE (price > 100 AND stock > 0) OR category = 'Featured'
//!          ORDER BY price DESC LIMIT 10 OFFSET 20
//! ```

pub mod ast;
pub mod engine;
pub mod parser;
pub mod tokens;

pub use ast::*;
pub use engine::{execute, Filter, QueryEngine};
pub use parser::{parse, unwrap_query_marker, Parser};
pub use tokens::{tokenize, Token, TokenKind};
