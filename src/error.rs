//! Error handling for sensor-log ingestion.
//!
//! Per-reading parse failures never surface here; they are absorbed and
//! counted by the normalizer and the stream processor. These variants cover
//! failures that are fatal for a whole file, sink hand-off or transform stream.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unsupported format '{format}' for line-oriented parsing: {path}")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("No usable header in {path}: {reason}")]
    MissingColumns { path: PathBuf, reason: String },

    #[error("Could not match {file_name} to any target sensor")]
    UnmatchedSensor { file_name: String },

    #[error("Chunk processor failed: {reason}")]
    ChunkProcessor { reason: String },

    #[error("Reading sink rejected batch: {reason}")]
    Sink { reason: String },

    #[error("Line processor failed at line {line_number}: {reason}")]
    LineFailed { line_number: usize, reason: String },
}

impl IngestError {
    /// Wrap an I/O error with the path that produced it, mapping `NotFound`
    /// onto the dedicated variant.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn chunk_processor(reason: impl Into<String>) -> Self {
        Self::ChunkProcessor {
            reason: reason.into(),
        }
    }

    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
        }
    }

    pub fn line_failed(line_number: usize, reason: impl Into<String>) -> Self {
        Self::LineFailed {
            line_number,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
