//! Ingest command: parse and normalize files into readings

use crate::cli::args::{IngestArgs, OutputFormat};
use crate::cli::commands::shared::{
    create_progress_bar, discover_files, format_duration_ms, load_configuration, setup_logging,
};
use crate::config::{IngestConfig, TextEncoding};
use crate::error::IngestError;
use crate::metrics::MetricsTracker;
use crate::models::{FileMeta, FileOutcome, JobOutcome, NormalizedReading, Progress};
use crate::pipeline::{IngestPipeline, ReadingSink, file_job_id, match_file_to_sensor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use colored::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Sink writing one JSON object per reading
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> crate::error::Result<Self> {
        let file = File::create(path).map_err(|e| IngestError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn flush(&self) -> crate::error::Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flush()
            .map_err(|e| IngestError::io(&self.path, e))
    }
}

#[async_trait]
impl ReadingSink for JsonLinesSink {
    async fn write_batch(
        &self,
        _job_id: &str,
        readings: &[NormalizedReading],
    ) -> crate::error::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        for reading in readings {
            serde_json::to_writer(&mut *writer, reading)
                .map_err(|e| IngestError::sink(e.to_string()))?;
            writer
                .write_all(b"\n")
                .map_err(|e| IngestError::io(&self.path, e))?;
        }
        Ok(())
    }
}

/// Apply CLI overrides on top of the loaded configuration
pub fn apply_cli_overrides(config: &mut IngestConfig, args: &IngestArgs) -> Result<()> {
    if let Some(concurrency) = args.concurrency {
        config.stream.max_concurrency = concurrency;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.stream.chunk_size = chunk_size;
    }
    if args.latin1 {
        config.stream.encoding = TextEncoding::Latin1;
    }

    config.validate().context("Invalid configuration")?;
    Ok(())
}

pub async fn run_ingest(args: &IngestArgs) -> Result<()> {
    setup_logging(&args.common)?;
    let mut config = load_configuration(&args.common)?;
    apply_cli_overrides(&mut config, args)?;

    let files = discover_files(&args.common.inputs)?;
    let job_id = args
        .job_id
        .clone()
        .unwrap_or_else(|| format!("job-{}", Local::now().format("%Y%m%d%H%M%S")));
    let show_progress = args.common.show_progress();

    if show_progress {
        println!(
            "{} {} ({} files)",
            "Ingesting job".bright_green().bold(),
            job_id.bright_white().bold(),
            files.len()
        );
    }

    let metrics = Arc::new(MetricsTracker::new(config.metrics_capacity));
    let pipeline = IngestPipeline::new(config, metrics)?;
    let sink = args
        .output_path
        .as_deref()
        .map(JsonLinesSink::create)
        .transpose()?;

    let mut job = JobOutcome::new(&job_id);
    for (index, path) in files.iter().enumerate() {
        let meta = FileMeta::from_path(path);
        let file_job = file_job_id(&job_id, index);

        let sensor_id = if args.sensors.is_empty() {
            args.sensor_id.as_deref()
        } else {
            match match_file_to_sensor(&meta.file_name, &args.sensors) {
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

        let pb = show_progress.then(|| create_progress_bar(100, &meta.file_name));
        let mut on_progress = |progress: Progress| {
            if let Some(pb) = &pb {
                pb.set_position(progress.percentage as u64);
                pb.set_message(format!(
                    "{} ({} rows, {} failed)",
                    meta.file_name, progress.processed, progress.failed
                ));
            }
        };

        let result = match &sink {
            Some(sink) => {
                pipeline
                    .ingest_into(&file_job, &meta, sensor_id, sink, Some(&mut on_progress))
                    .await
            }
            None => {
                pipeline
                    .ingest_file(&file_job, &meta, sensor_id, Some(&mut on_progress))
                    .await
            }
        };

        match result {
            Ok(outcome) => {
                if let Some(pb) = &pb {
                    pb.finish_with_message(format!(
                        "{}: {} readings",
                        meta.file_name,
                        outcome.readings.len()
                    ));
                }
                job.push_file(outcome);
            }
            Err(e) => {
                if let Some(pb) = &pb {
                    pb.abandon_with_message(format!("{}: failed", meta.file_name));
                }
                warn!("Failed to ingest {}: {}", meta.file_name, e);
                job.push_file_error(meta.file_name.clone(), e.to_string());
            }
        }
    }

    if let Some(sink) = &sink {
        sink.flush()?;
        debug!("Readings written to {}", sink.path.display());
    }

    match args.common.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&job_summary_json(&job))?)
        }
        OutputFormat::Human if !args.common.quiet => print_job_summary(&job),
        OutputFormat::Human => {}
    }

    if job.files.is_empty() && !job.file_errors.is_empty() {
        anyhow::bail!("No file could be ingested");
    }
    Ok(())
}

fn file_summary_json(outcome: &FileOutcome) -> serde_json::Value {
    serde_json::json!({
        "file_name": outcome.file_name,
        "format": outcome.heuristics.format,
        "vendor": outcome.heuristics.vendor_guess,
        "score": outcome.heuristics.score,
        "delimiter": outcome.delimiter.to_string(),
        "processed": outcome.processed,
        "failed": outcome.failed,
        "readings": outcome.readings.len(),
        "skipped": outcome.skipped,
        "duration_ms": outcome.duration_ms,
    })
}

/// Job summary without the readings themselves
pub fn job_summary_json(job: &JobOutcome) -> serde_json::Value {
    serde_json::json!({
        "job_id": job.job_id,
        "total_processed": job.total_processed,
        "total_failed": job.total_failed,
        "total_readings": job.total_readings,
        "success_rate": job.success_rate(),
        "files": job.files.iter().map(file_summary_json).collect::<Vec<_>>(),
        "file_errors": job.file_errors.iter().map(|(file, reason)| {
            serde_json::json!({ "file_name": file, "error": reason })
        }).collect::<Vec<_>>(),
    })
}

fn print_job_summary(job: &JobOutcome) {
    println!("\n{}", "Ingestion Summary".bright_green().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for outcome in &job.files {
        println!(
            "  {} {} [{} / {}, {}]",
            "•".bright_cyan(),
            outcome.file_name.bright_white().bold(),
            outcome.heuristics.format,
            outcome.heuristics.vendor_guess.as_deref().unwrap_or("unknown vendor"),
            format_duration_ms(outcome.duration_ms)
        );
        println!(
            "      {} readings, {} skipped, {} failed of {} rows",
            outcome.readings.len().to_string().bright_green(),
            outcome.skipped_total(),
            outcome.failed,
            outcome.processed
        );
        for (reason, count) in &outcome.skipped {
            println!("        {}: {}", reason, count);
        }
    }

    for (file, reason) in &job.file_errors {
        println!("  {} {}: {}", "✗".bright_red(), file.bright_white(), reason);
    }

    println!(
        "\n  {} {} readings from {} files ({:.1}% of rows usable)",
        "Total:".bright_cyan(),
        job.total_readings.to_string().bright_white().bold(),
        job.files.len(),
        job.success_rate()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Args, Commands};
    use clap::Parser;
    use tempfile::TempDir;

    fn ingest_args(extra: &[&str]) -> IngestArgs {
        let mut argv = vec!["sensorlog-ingest", "ingest", "in.csv"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Some(Commands::Ingest(args)) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = IngestConfig::default();
        apply_cli_overrides(
            &mut config,
            &ingest_args(&["--concurrency", "2", "--chunk-size", "50", "--latin1"]),
        )
        .unwrap();

        assert_eq!(config.stream.max_concurrency, 2);
        assert_eq!(config.stream.chunk_size, 50);
        assert_eq!(config.stream.encoding, TextEncoding::Latin1);
    }

    #[test]
    fn test_cli_overrides_validated() {
        let mut config = IngestConfig::default();
        assert!(apply_cli_overrides(&mut config, &ingest_args(&["--concurrency", "0"])).is_err());
    }

    #[tokio::test]
    async fn test_json_lines_sink() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.jsonl");
        let sink = JsonLinesSink::create(&path).unwrap();

        let reading = NormalizedReading {
            sensor_id: "S-01".to_string(),
            timestamp: Local::now(),
            temperature: 21.5,
            humidity: None,
        };
        sink.write_batch("job", &[reading.clone(), reading]).await.unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: NormalizedReading = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.sensor_id, "S-01");
        assert_eq!(parsed.temperature, 21.5);
    }

    #[test]
    fn test_job_summary_json() {
        let mut job = JobOutcome::new("job-1");
        job.push_file_error("logger.xlsx", "unsupported");
        let value = job_summary_json(&job);

        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["file_errors"][0]["file_name"], "logger.xlsx");
        assert_eq!(value["total_readings"], 0);
    }
}
