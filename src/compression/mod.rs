//! Document compression: dictionary substitution plus pass-through delta
//! and pattern stages, dispatched by [`CompressionMode`].

pub mod algorithms;
pub mod engine;

pub use algorithms::{
    CompressionAlgorithm, CompressionMetadata, DeltaCompression, Dictionary,
    DictionaryCompression, PatternCompression,
};
pub use engine::{serialized_size, CompressionEngine, CompressionMode};
