//! File and job ingestion.
//!
//! Ties detection, column mapping, streaming and normalization together:
//! sample the file, score its format, locate the header, stream the data
//! rows through the normalizer and record every stage into the shared
//! [`MetricsTracker`].

use crate::columns::{ColumnMapping, find_header, split_record};
use crate::config::IngestConfig;
use crate::constants::{counters, stages};
use crate::detector::{detect_delimiter, detect_format, is_line_oriented, sample_file};
use crate::error::{IngestError, Result};
use crate::metrics::MetricsTracker;
use crate::models::{
    FileMeta, FileOutcome, JobOutcome, NormalizedReading, SkipReason, TargetSensor,
};
use crate::normalizer::classify_reading;
use crate::processor::{ProgressCallback, StreamProcessor, chunk_transform};
use async_trait::async_trait;
use futures::{TryStreamExt, stream};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Downstream consumer of normalized readings (persistence layer)
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn write_batch(&self, job_id: &str, readings: &[NormalizedReading]) -> Result<()>;
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    readings: Mutex<Vec<NormalizedReading>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<NormalizedReading> {
        self.readings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.readings.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn write_batch(&self, _job_id: &str, readings: &[NormalizedReading]) -> Result<()> {
        self.readings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(readings);
        Ok(())
    }
}

/// Ingestion orchestrator
#[derive(Debug)]
pub struct IngestPipeline {
    config: IngestConfig,
    metrics: Arc<MetricsTracker>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, metrics: Arc<MetricsTracker>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, metrics })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }

    /// Ingest one file under `job_id`.
    ///
    /// Rows the normalizer rejects are counted per [`SkipReason`]; rows that
    /// cannot be split into fields count as failed. Neither stops the file.
    /// Readings are returned sorted by timestamp.
    pub async fn ingest_file(
        &self,
        job_id: &str,
        meta: &FileMeta,
        fallback_sensor_id: Option<&str>,
        on_progress: ProgressCallback<'_>,
    ) -> Result<FileOutcome> {
        let started = Instant::now();

        let detect_started = Instant::now();
        let sample = sample_file(meta, self.config.sample_bytes);
        let heuristics = detect_format(meta, sample.as_deref());
        let detect_ms = detect_started.elapsed().as_millis() as u64;

        self.metrics.start_tracking(
            job_id,
            &meta.file_name,
            heuristics.vendor_guess.as_deref(),
            Some(heuristics.format.as_str()),
        );
        self.metrics.record_stage(job_id, stages::DETECT, detect_ms);

        debug!(
            file = %meta.file_name,
            score = heuristics.score,
            vendor = heuristics.vendor_guess.as_deref().unwrap_or("-"),
            "Detected {}",
            heuristics.format
        );
        if heuristics.score < self.config.min_detection_score {
            warn!(
                "Weak format guess for {} (score {}): {}",
                meta.file_name,
                heuristics.score,
                heuristics.reasons.join("; ")
            );
        }

        if !is_line_oriented(heuristics.format) {
            return Err(self.fail(
                job_id,
                IngestError::UnsupportedFormat {
                    path: meta.absolute_path.clone(),
                    format: heuristics.format.to_string(),
                },
            ));
        }

        if let Err(e) = std::fs::metadata(&meta.absolute_path) {
            return Err(self.fail(job_id, IngestError::io(&meta.absolute_path, e)));
        }

        let Some(sample) = sample else {
            return Err(self.fail(
                job_id,
                IngestError::MissingColumns {
                    path: meta.absolute_path.clone(),
                    reason: "file is empty or unreadable".to_string(),
                },
            ));
        };

        let delimiter = detect_delimiter(&sample);
        let text = self.config.stream.encoding.decode(&sample);
        let Some((header_index, mapping)) =
            find_header(&text, delimiter, self.config.header_search_lines)
        else {
            return Err(self.fail(
                job_id,
                IngestError::MissingColumns {
                    path: meta.absolute_path.clone(),
                    reason: format!(
                        "no timestamp and temperature columns in the first {} lines",
                        self.config.header_search_lines
                    ),
                },
            ));
        };

        let skip = self.config.stream.skip_leading_lines.max(header_index + 1);
        let processor =
            StreamProcessor::new(self.config.stream.clone().with_skip_leading_lines(skip))?;

        let skipped: Mutex<BTreeMap<SkipReason, usize>> = Mutex::new(BTreeMap::new());
        let parse = processor.process_file(
            &meta.absolute_path,
            |line, line_number| {
                parse_line(line, line_number, delimiter, &mapping, fallback_sensor_id, &skipped)
            },
            on_progress,
        );
        let result = self.metrics.time_stage(job_id, stages::PARSE, parse).await;

        let outcome = result.map_err(|e| self.fail(job_id, e))?;
        let skipped = skipped.into_inner().unwrap_or_else(|e| e.into_inner());

        let mut readings = outcome.results;
        readings.sort_by_key(|r| r.timestamp);

        let skipped_total: usize = skipped.values().sum();
        self.count(job_id, counters::LINES_TOTAL, outcome.processed);
        self.count(job_id, counters::READINGS_VALID, readings.len());
        self.count(job_id, counters::READINGS_SKIPPED, skipped_total);
        self.count(job_id, counters::LINES_FAILED, outcome.failed);
        for (reason, count) in &skipped {
            self.count(job_id, &reason.counter_name(), *count);
        }

        let mut errors = Vec::new();
        if outcome.failed > 0 {
            let message = format!("{} lines could not be split into fields", outcome.failed);
            self.metrics.record_error(job_id, &message);
            errors.push(message);
        }

        self.metrics.log_summary(job_id);

        Ok(FileOutcome {
            file_name: meta.file_name.clone(),
            heuristics,
            delimiter: delimiter as char,
            readings,
            processed: outcome.processed,
            failed: outcome.failed,
            skipped,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Ingest a file and hand its readings to `sink` in `chunk_size` batches.
    ///
    /// A sink error aborts the hand-off; batches already written stay written.
    pub async fn ingest_into<S>(
        &self,
        job_id: &str,
        meta: &FileMeta,
        fallback_sensor_id: Option<&str>,
        sink: &S,
        on_progress: ProgressCallback<'_>,
    ) -> Result<FileOutcome>
    where
        S: ReadingSink + ?Sized,
    {
        let outcome = self
            .ingest_file(job_id, meta, fallback_sensor_id, on_progress)
            .await?;

        let sink_started = Instant::now();
        let written: Result<Vec<usize>> = chunk_transform(
            stream::iter(outcome.readings.iter().cloned()),
            self.config.stream.chunk_size,
            |chunk: Vec<NormalizedReading>| async move {
                sink.write_batch(job_id, &chunk).await?;
                Ok::<_, IngestError>(vec![chunk.len()])
            },
        )
        .try_collect()
        .await;
        self.metrics
            .record_stage(job_id, stages::SINK, sink_started.elapsed().as_millis() as u64);

        let written = written.map_err(|e| self.fail(job_id, e))?;
        self.count(job_id, counters::READINGS_WRITTEN, written.iter().sum());

        Ok(outcome)
    }

    /// Ingest several files as one job.
    ///
    /// Each file is tracked under `<job_id>:<n>` (1-based). With a non-empty
    /// `sensors` set every file must match one of them (see
    /// [`match_file_to_sensor`]); the match supplies the sensor id for rows
    /// that carry none. A file that fails, including one that matches no
    /// sensor, is listed in the outcome's `file_errors` and the job moves on.
    pub async fn ingest_job(
        &self,
        job_id: &str,
        files: &[FileMeta],
        sensors: &[TargetSensor],
    ) -> JobOutcome {
        let mut job = JobOutcome::new(job_id);

        for (index, meta) in files.iter().enumerate() {
            let file_job_id = file_job_id(job_id, index);
            let fallback_sensor_id = if sensors.is_empty() {
                None
            } else {
                match match_file_to_sensor(&meta.file_name, sensors) {
                    Some(sensor) => Some(sensor.id.as_str()),
                    None => {
                        let e = IngestError::UnmatchedSensor {
                            file_name: meta.file_name.clone(),
                        };
                        warn!("Skipping {}: {}", meta.file_name, e);
                        job.push_file_error(meta.file_name.clone(), e.to_string());
                        continue;
                    }
                }
            };

            match self
                .ingest_file(&file_job_id, meta, fallback_sensor_id, None)
                .await
            {
                Ok(outcome) => job.push_file(outcome),
                Err(e) => {
                    warn!("Skipping {}: {}", meta.file_name, e);
                    job.push_file_error(meta.file_name.clone(), e.to_string());
                }
            }
        }

        info!(
            job_id,
            files = job.files.len(),
            failed_files = job.file_errors.len(),
            readings = job.total_readings,
            "Job finished: {:.1}% success",
            job.success_rate()
        );

        job
    }

    fn count(&self, job_id: &str, counter: &str, amount: usize) {
        self.metrics.increment_counter(job_id, counter, amount as u64);
    }

    fn fail(&self, job_id: &str, error: IngestError) -> IngestError {
        self.metrics.record_error(job_id, &error.to_string());
        error
    }
}

/// Pick the target sensor a file belongs to.
///
/// A sensor whose serial number appears in the file name (case-insensitive)
/// wins, first in `sensors` order. Otherwise a single-sensor set matches any
/// file.
pub fn match_file_to_sensor<'a>(
    file_name: &str,
    sensors: &'a [TargetSensor],
) -> Option<&'a TargetSensor> {
    let file_name = file_name.to_lowercase();
    let by_serial = sensors.iter().find(|sensor| {
        let serial = sensor.serial_number.trim().to_lowercase();
        !serial.is_empty() && file_name.contains(&serial)
    });

    match (by_serial, sensors) {
        (Some(sensor), _) => {
            debug!(sensor = %sensor.id, "Matched {} by serial number", file_name);
            Some(sensor)
        }
        (None, [only]) => Some(only),
        (None, _) => None,
    }
}

/// Metrics id of the `index`-th (0-based) file of a job
pub fn file_job_id(job_id: &str, index: usize) -> String {
    format!("{}:{}", job_id, index + 1)
}

async fn parse_line(
    line: String,
    line_number: usize,
    delimiter: u8,
    mapping: &ColumnMapping,
    fallback_sensor_id: Option<&str>,
    skipped: &Mutex<BTreeMap<SkipReason, usize>>,
) -> Result<Option<NormalizedReading>> {
    let fields = split_record(&line, delimiter)
        .map_err(|e| IngestError::line_failed(line_number, e.to_string()))?;

    match classify_reading(&mapping.extract(&fields), fallback_sensor_id) {
        Ok(reading) => Ok(Some(reading)),
        Err(reason) => {
            *skipped
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(reason)
                .or_insert(0) += 1;
            Ok(None)
        }
    }
}
