//! Configuration management and validation.
//!
//! Provides the stream processor tuning knobs and the ingestion-level
//! settings, loadable from a TOML file and overridable from the CLI.

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CHUNK_SIZE, DEFAULT_HIGH_WATER_MARK,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_METRICS_CAPACITY, DEFAULT_SAMPLE_BYTES,
};
use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Text encoding used to decode file lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8; invalid sequences are replaced, not rejected
    #[default]
    Utf8,
    /// ISO-8859-1, common in older Windows datalogger software
    Latin1,
}

impl TextEncoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Configuration for one stream processor instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamProcessorConfig {
    /// Progress cadence in line mode, batch size in batch mode
    pub chunk_size: usize,

    /// Read buffer size in bytes
    pub high_water_mark: usize,

    pub encoding: TextEncoding,

    /// Skip whitespace-only lines without dispatching them
    pub skip_empty_lines: bool,

    /// Maximum outstanding line-processor calls
    pub max_concurrency: usize,

    /// Leading lines (preamble and header) read but never dispatched
    pub skip_leading_lines: usize,
}

impl Default for StreamProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            encoding: TextEncoding::Utf8,
            skip_empty_lines: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            skip_leading_lines: 0,
        }
    }
}

impl StreamProcessorConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_skip_empty_lines(mut self, skip: bool) -> Self {
        self.skip_empty_lines = skip;
        self
    }

    pub fn with_skip_leading_lines(mut self, lines: usize) -> Self {
        self.skip_leading_lines = lines;
        self
    }

    /// Zero values are rejected; a zero chunk size would never emit
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IngestError::configuration("chunk_size must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(IngestError::configuration(
                "max_concurrency must be at least 1",
            ));
        }
        if self.high_water_mark == 0 {
            return Err(IngestError::configuration(
                "high_water_mark must be at least 1 byte",
            ));
        }
        Ok(())
    }
}

/// Top-level ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub stream: StreamProcessorConfig,

    /// Bytes sampled from each file for detection
    pub sample_bytes: usize,

    /// Job records kept by the metrics tracker
    pub metrics_capacity: usize,

    /// Files scoring below this are still parsed but logged as weak guesses
    pub min_detection_score: i32,

    /// Lines of the sample searched for a usable header
    pub header_search_lines: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream: StreamProcessorConfig::default(),
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            metrics_capacity: DEFAULT_METRICS_CAPACITY,
            min_detection_score: 10,
            header_search_lines: 20,
        }
    }
}

impl IngestConfig {
    /// Default config file location (`<config_dir>/sensorlog-ingest/config.toml`)
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| IngestError::configuration("Could not determine config directory"))
    }

    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| IngestError::configuration(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Explicit file, else the default location if it exists, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_config_path() {
            Ok(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn with_stream(mut self, stream: StreamProcessorConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_sample_bytes(mut self, sample_bytes: usize) -> Self {
        self.sample_bytes = sample_bytes;
        self
    }

    pub fn with_metrics_capacity(mut self, capacity: usize) -> Self {
        self.metrics_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        if self.sample_bytes == 0 {
            return Err(IngestError::configuration("sample_bytes must be at least 1"));
        }
        if self.metrics_capacity == 0 {
            return Err(IngestError::configuration(
                "metrics_capacity must be at least 1",
            ));
        }
        if self.header_search_lines == 0 {
            return Err(IngestError::configuration(
                "header_search_lines must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.stream.chunk_size, 1000);
        assert_eq!(config.stream.high_water_mark, 64 * 1024);
        assert_eq!(config.stream.max_concurrency, 5);
        assert!(config.stream.skip_empty_lines);
        assert_eq!(config.stream.encoding, TextEncoding::Utf8);
        assert_eq!(config.sample_bytes, 4096);
        assert_eq!(config.metrics_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            sample_bytes = 8192

            [stream]
            max_concurrency = 2
            encoding = "latin1"
            "#,
        )
        .unwrap();

        assert_eq!(config.sample_bytes, 8192);
        assert_eq!(config.stream.max_concurrency, 2);
        assert_eq!(config.stream.encoding, TextEncoding::Latin1);
        assert_eq!(config.stream.chunk_size, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(IngestConfig::from_toml_str("[stream]\nchunk_size = 0").is_err());
        assert!(IngestConfig::from_toml_str("metrics_capacity = 0").is_err());
        assert!(IngestConfig::from_toml_str("sample_bytes = \"lots\"").is_err());
        assert!(
            StreamProcessorConfig::default()
                .with_max_concurrency(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "header_search_lines = 5").unwrap();

        let config = IngestConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.header_search_lines, 5);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = IngestConfig::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(IngestError::FileNotFound { .. })));
    }

    #[test]
    fn test_latin1_decoding() {
        assert_eq!(TextEncoding::Latin1.decode(&[0x55, 0x6d, 0x69, 0x64, 0xe9]), "Umidé");
        assert_eq!(TextEncoding::Utf8.decode("Umidé".as_bytes()), "Umidé");
    }
}
