//! Streaming processing of large datalogger exports.
//!
//! Provides three drivers over a file's lines:
//! - line mode ([`StreamProcessor::process_file`]): bounded-concurrency
//!   per-line processing with continue-on-error
//! - batch mode ([`StreamProcessor::process_batches`]): serialized batches,
//!   a failing batch is counted as failed as a whole
//! - [`ChunkTransform`]: chunked transform whose processor errors are fatal

pub mod batching;
pub mod chunked;
pub mod lines;
pub mod streaming;

#[cfg(test)]
pub mod tests;

pub use chunked::{ChunkTransform, chunk_transform};
pub use lines::{LineReader, estimate_file_line_count, text_lines};

use crate::config::StreamProcessorConfig;
use crate::constants::LOG_LINE_PREVIEW_CHARS;
use crate::error::Result;
use crate::models::{Progress, ProcessorStats};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Optional progress callback accepted by the streaming drivers
pub type ProgressCallback<'a> = Option<&'a mut (dyn FnMut(Progress) + Send)>;

/// Line/batch stream processor.
///
/// Every call returns a self-contained [`ProcessingOutcome`](crate::models::ProcessingOutcome).
/// The instance additionally keeps cumulative counters across calls for
/// [`stats`](Self::stats); use one instance per job or call
/// [`reset`](Self::reset) between files.
#[derive(Debug)]
pub struct StreamProcessor {
    config: StreamProcessorConfig,
    processed: AtomicUsize,
    failed: AtomicUsize,
}

impl StreamProcessor {
    /// Create a processor, rejecting invalid configuration
    pub fn new(config: StreamProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &StreamProcessorConfig {
        &self.config
    }

    /// Zero the cumulative counters
    pub fn reset(&self) {
        self.processed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    /// Cumulative counters with the derived success rate (percent)
    pub fn stats(&self) -> ProcessorStats {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let success_rate = if processed > 0 {
            processed.saturating_sub(failed) as f64 / processed as f64 * 100.0
        } else {
            0.0
        };

        ProcessorStats {
            processed,
            failed,
            success_rate,
        }
    }

    fn record(&self, processed: usize, failed: usize) {
        self.processed.fetch_add(processed, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
    }

    fn should_skip(&self, line: &str) -> bool {
        self.config.skip_empty_lines && line.trim().is_empty()
    }
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self {
            config: StreamProcessorConfig::default(),
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }
}

/// First [`LOG_LINE_PREVIEW_CHARS`] characters of a line, for error logs
pub(crate) fn line_preview(line: &str) -> String {
    line.chars().take(LOG_LINE_PREVIEW_CHARS).collect()
}

fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((processed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
