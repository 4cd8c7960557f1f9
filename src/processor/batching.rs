//! Batch mode: serialized processing of fixed-size line batches.

use super::lines::LineReader;
use super::{ProgressCallback, StreamProcessor};
use crate::error::Result;
use crate::models::{ProcessingOutcome, Progress};
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use tracing::{debug, error};

impl StreamProcessor {
    /// Process a file in batches of `chunk_size` lines.
    ///
    /// Reading stops while a batch is being processed, so batches never
    /// overlap and results keep batch order. A batch-processor error marks
    /// every line of that batch as failed; the batch is dropped and the next
    /// one proceeds. The trailing partial batch is flushed at end of file.
    ///
    /// Progress fires after each successful batch with a percentage of 0,
    /// since the total is not counted in this mode, and once at the end
    /// with 100. A failed batch still counts toward `processed`.
    pub async fn process_batches<T, E, F, Fut>(
        &self,
        path: &Path,
        batch_processor: F,
        mut on_progress: ProgressCallback<'_>,
    ) -> Result<ProcessingOutcome<T>>
    where
        F: Fn(Vec<String>, usize) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<Vec<T>, E>> + Send,
        T: Send,
        E: Display + Send,
    {
        let mut reader = LineReader::open(path, &self.config).await?;
        let mut outcome = ProcessingOutcome {
            results: Vec::new(),
            processed: 0,
            failed: 0,
        };
        let mut batch: Vec<String> = Vec::with_capacity(self.config.chunk_size);
        let mut batch_start_line = 1;
        let mut line_number = 0usize;

        while let Some(line) = reader.next_line().await? {
            line_number += 1;

            if line_number <= self.config.skip_leading_lines || self.should_skip(&line) {
                continue;
            }

            if batch.is_empty() {
                batch_start_line = line_number;
            }
            batch.push(line);

            if batch.len() >= self.config.chunk_size {
                let full =
                    std::mem::replace(&mut batch, Vec::with_capacity(self.config.chunk_size));
                self.run_batch(
                    &batch_processor,
                    full,
                    batch_start_line,
                    &mut outcome,
                    &mut on_progress,
                )
                .await;
            }
        }

        if !batch.is_empty() {
            self.run_batch(
                &batch_processor,
                batch,
                batch_start_line,
                &mut outcome,
                &mut on_progress,
            )
            .await;
        }

        report(&mut on_progress, &outcome, 100);
        self.record(outcome.processed, outcome.failed);

        debug!(
            "Finished batches for {}: {} processed, {} failed",
            path.display(),
            outcome.processed,
            outcome.failed
        );

        Ok(outcome)
    }

    async fn run_batch<T, E, F, Fut>(
        &self,
        batch_processor: &F,
        batch: Vec<String>,
        start_line: usize,
        outcome: &mut ProcessingOutcome<T>,
        on_progress: &mut ProgressCallback<'_>,
    ) where
        F: Fn(Vec<String>, usize) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<Vec<T>, E>> + Send,
        T: Send,
        E: Display + Send,
    {
        let size = batch.len();
        outcome.processed += size;

        match batch_processor(batch, start_line).await {
            Ok(results) => {
                outcome.results.extend(results);
                report(on_progress, outcome, 0);
            }
            Err(e) => {
                outcome.failed += size;
                error!(
                    batch_size = size,
                    error = %e,
                    "Error processing batch starting at line {}",
                    start_line
                );
            }
        }
    }
}

fn report<T>(
    on_progress: &mut ProgressCallback<'_>,
    outcome: &ProcessingOutcome<T>,
    percentage: u8,
) {
    if let Some(callback) = on_progress.as_deref_mut() {
        callback(Progress {
            processed: outcome.processed,
            failed: outcome.failed,
            percentage,
        });
    }
}
