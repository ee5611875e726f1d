//! Encoder configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::compression::{CompressionMode, DictionaryCompression};
use crate::error::{AtonError, AtonResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ATON_CONFIG";

/// Dictionary thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// Minimum string length, in characters
    pub min_length: usize,

    /// Minimum number of occurrences in the document
    pub min_occurrences: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        let defaults = DictionaryCompression::default();
        Self {
            min_length: defaults.min_length,
            min_occurrences: defaults.min_occurrences,
        }
    }
}

impl From<DictionaryConfig> for DictionaryCompression {
    fn from(config: DictionaryConfig) -> Self {
        DictionaryCompression::new(config.min_length, config.min_occurrences)
    }
}

/// Main encoder configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Infer and elide per-field defaults
    pub optimize: bool,

    /// Compression strategy
    pub compression: CompressionMode,

    /// Emit an `@queryable[table]` marker per table
    pub queryable: bool,

    /// Check the document shape before encoding
    pub validate: bool,

    /// Records per chunk when streaming
    pub chunk_size: usize,

    pub dictionary: DictionaryConfig,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            compression: CompressionMode::default(),
            queryable: false,
            validate: true,
            chunk_size: 100,
            dictionary: DictionaryConfig::default(),
        }
    }
}

impl EncoderConfig {
    /// Create a new configuration builder
    pub fn builder() -> EncoderConfigBuilder {
        EncoderConfigBuilder::default()
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> AtonResult<Self> {
        toml::from_str(content).map_err(|e| AtonError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> AtonResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| AtonError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// `$ATON_CONFIG` if set, else `<config dir>/aton/config.toml` if it
    /// exists, else the defaults.
    pub fn discover() -> AtonResult<Self> {
        match Self::discover_path(std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn discover_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }
        dirs::config_dir()
            .map(|dir| dir.join("aton").join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Reject settings no encoder can run with.
    pub fn check(&self) -> AtonResult<()> {
        if self.chunk_size == 0 {
            return Err(AtonError::Config("chunk_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for EncoderConfig
#[derive(Debug, Default)]
pub struct EncoderConfigBuilder {
    config: EncoderConfig,
}

impl EncoderConfigBuilder {
    /// Enable or disable default elision
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.config.optimize = optimize;
        self
    }

    /// Set the compression mode
    pub fn compression(mut self, mode: CompressionMode) -> Self {
        self.config.compression = mode;
        self
    }

    /// Emit `@queryable` markers
    pub fn queryable(mut self, queryable: bool) -> Self {
        self.config.queryable = queryable;
        self
    }

    /// Enable or disable shape validation
    pub fn validate(mut self, validate: bool) -> Self {
        self.config.validate = validate;
        self
    }

    /// Set the streaming chunk size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the dictionary thresholds
    pub fn dictionary(mut self, min_length: usize, min_occurrences: usize) -> Self {
        self.config.dictionary = DictionaryConfig {
            min_length,
            min_occurrences,
        };
        self
    }

    /// Build the configuration
    pub fn build(self) -> EncoderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EncoderConfig::default();
        assert!(config.optimize);
        assert!(config.validate);
        assert!(!config.queryable);
        assert_eq!(config.compression, CompressionMode::Balanced);
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.dictionary.min_length, 5);
        assert_eq!(config.dictionary.min_occurrences, 3);
    }

    #[test]
    fn test_partial_toml() {
        let config = EncoderConfig::from_toml(
            r#"
            compression = "ULTRA"
            queryable = true

            [dictionary]
            min_length = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.compression, CompressionMode::Ultra);
        assert!(config.queryable);
        assert!(config.optimize);
        assert_eq!(config.dictionary.min_length, 8);
        assert_eq!(config.dictionary.min_occurrences, 3);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let err = EncoderConfig::from_toml(r#"compression = "zip""#).unwrap_err();
        assert!(matches!(err, AtonError::Config(_)));
        assert!(err.to_string().contains("zip"));
    }

    #[test]
    fn test_builder() {
        let config = EncoderConfig::builder()
            .compression(CompressionMode::Fast)
            .optimize(false)
            .chunk_size(10)
            .dictionary(3, 2)
            .build();
        assert_eq!(config.compression, CompressionMode::Fast);
        assert!(!config.optimize);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(
            DictionaryCompression::from(config.dictionary),
            DictionaryCompression::new(3, 2)
        );
    }

    #[test]
    fn test_check_chunk_size() {
        assert!(EncoderConfig::default().check().is_ok());
        let config = EncoderConfig::builder().chunk_size(0).build();
        assert!(matches!(config.check(), Err(AtonError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("aton-config-{}.toml", std::process::id()));
        fs::write(&path, "optimize = false\nchunk_size = 25\n").unwrap();
        let config = EncoderConfig::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert!(!config.optimize);
        assert_eq!(config.chunk_size, 25);

        let missing = EncoderConfig::load("/nonexistent/aton/config.toml").unwrap_err();
        assert!(matches!(missing, AtonError::Io(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(
            EncoderConfig::discover_path(Some(explicit.clone())),
            Some(explicit)
        );
    }
}
