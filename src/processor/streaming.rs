//! Line mode: per-line processing with bounded concurrency.
//!
//! The file is read twice: once to count lines for an exact progress
//! percentage, once to dispatch. At most `max_concurrency` line-processor
//! calls are outstanding; while the set is full no further line is read,
//! and reading resumes as soon as any one call settles.

use super::lines::{LineReader, count_lines};
use super::{ProgressCallback, StreamProcessor, line_preview, percentage};
use crate::error::Result;
use crate::models::{ProcessingOutcome, Progress};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, error};

/// An in-flight line-processor call tagged with its line number and preview
type LineCall<'a, T, E> =
    Pin<Box<dyn Future<Output = (usize, String, std::result::Result<Option<T>, E>)> + Send + 'a>>;

/// Running totals of one `process_file` call
struct LineTally<T> {
    results: Vec<T>,
    processed: usize,
    failed: usize,
    succeeded: usize,
}

impl<T> Default for LineTally<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            processed: 0,
            failed: 0,
            succeeded: 0,
        }
    }
}

impl StreamProcessor {
    /// Process a file line by line.
    ///
    /// `line_processor` receives the decoded line and its 1-based line
    /// number (skipped lines still advance the number). `Ok(Some(r))` is
    /// collected, `Ok(None)` is processed without a result, and `Err` counts
    /// as failed and is logged without stopping the stream. Every settled
    /// call counts as processed.
    ///
    /// Results are collected in completion order, which differs from input
    /// order when `max_concurrency > 1`.
    ///
    /// Progress fires every `chunk_size` successful lines and once more at
    /// the end with 100%. I/O errors on the file are returned.
    ///
    /// The returned future is `Send`, so a whole ingestion can be spawned
    /// onto a multi-threaded runtime.
    pub async fn process_file<T, E, F, Fut>(
        &self,
        path: &Path,
        line_processor: F,
        mut on_progress: ProgressCallback<'_>,
    ) -> Result<ProcessingOutcome<T>>
    where
        F: Fn(String, usize) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send,
        T: Send,
        E: Display + Send,
    {
        let total_lines = count_lines(path, &self.config).await?;
        debug!(
            "Streaming {} ({} lines, max concurrency {})",
            path.display(),
            total_lines,
            self.config.max_concurrency
        );

        let mut reader = LineReader::open(path, &self.config).await?;
        let mut in_flight: FuturesUnordered<LineCall<'_, T, E>> = FuturesUnordered::new();
        let mut tally = LineTally::default();
        let mut line_number = 0usize;

        loop {
            if in_flight.len() >= self.config.max_concurrency {
                // Backpressure: no reading until a slot frees up
                if let Some(settled) = in_flight.next().await {
                    self.settle(settled, &mut tally, total_lines, &mut on_progress);
                }
                continue;
            }

            tokio::select! {
                biased;
                Some(settled) = in_flight.next(), if !in_flight.is_empty() => {
                    self.settle(settled, &mut tally, total_lines, &mut on_progress);
                }
                line = reader.next_line() => {
                    let Some(line) = line? else { break };
                    line_number += 1;

                    if line_number <= self.config.skip_leading_lines || self.should_skip(&line) {
                        continue;
                    }

                    let preview = line_preview(&line);
                    let number = line_number;
                    let call = line_processor(line, number);
                    in_flight.push(Box::pin(async move { (number, preview, call.await) }));
                }
            }
        }

        while let Some(settled) = in_flight.next().await {
            self.settle(settled, &mut tally, total_lines, &mut on_progress);
        }

        if let Some(callback) = on_progress.as_deref_mut() {
            callback(Progress {
                processed: tally.processed,
                failed: tally.failed,
                percentage: 100,
            });
        }

        self.record(tally.processed, tally.failed);
        debug!(
            "Finished {}: {} processed, {} failed, {} results",
            path.display(),
            tally.processed,
            tally.failed,
            tally.results.len()
        );

        Ok(ProcessingOutcome {
            results: tally.results,
            processed: tally.processed,
            failed: tally.failed,
        })
    }

    fn settle<T, E: Display>(
        &self,
        (line_number, preview, result): (usize, String, std::result::Result<Option<T>, E>),
        tally: &mut LineTally<T>,
        total_lines: usize,
        on_progress: &mut ProgressCallback<'_>,
    ) {
        tally.processed += 1;

        match result {
            Ok(value) => {
                if let Some(value) = value {
                    tally.results.push(value);
                }
                tally.succeeded += 1;

                if tally.succeeded % self.config.chunk_size == 0 {
                    if let Some(callback) = on_progress.as_deref_mut() {
                        callback(Progress {
                            processed: tally.processed,
                            failed: tally.failed,
                            percentage: percentage(tally.processed, total_lines),
                        });
                    }
                }
            }
            Err(e) => {
                tally.failed += 1;
                error!(line = %preview, error = %e, "Error processing line {}", line_number);
            }
        }
    }
}
