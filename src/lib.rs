//! Sensor-log ingestion library
//!
//! Turns heterogeneous datalogger exports (unknown column layout,
//! locale-specific numbers and dates, arbitrary file size) into a stream of
//! validated temperature/humidity readings.
//!
//! This library provides tools for:
//! - Scoring format and vendor guesses from a file's name and first bytes
//! - Parsing Brazilian and international number/date formats
//! - Streaming large files with bounded concurrency and backpressure
//! - Tracking per-job stage timings, counters and errors
//! - Orchestrating the above per file and per job

pub mod columns;
pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod processor;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::{IngestConfig, StreamProcessorConfig, TextEncoding};
pub use error::{IngestError, Result};
pub use metrics::MetricsTracker;
pub use models::{
    FileMeta, FileOutcome, Format, HeuristicResult, JobOutcome, NormalizedReading,
    ProcessingMetrics, ProcessingOutcome, Progress, RawReading, RawValue, SkipReason,
    TargetSensor,
};
pub use pipeline::{IngestPipeline, MemorySink, ReadingSink, match_file_to_sensor};
pub use processor::StreamProcessor;
