//! Core data structures for sensor-log ingestion.
//!
//! Defines file identity, detection results, raw and normalized readings,
//! progress/outcome records and per-job metrics.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a file to be sampled and parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub absolute_path: PathBuf,
    pub file_name: String,
    /// Lower-cased, including the leading dot (e.g. `.csv`); empty when absent
    pub extension: String,
    pub size_bytes: Option<u64>,
}

impl FileMeta {
    pub fn new(
        absolute_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            file_name: file_name.into(),
            extension: extension.into(),
            size_bytes: None,
        }
    }

    /// Derive name and extension from the path itself
    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let size_bytes = std::fs::metadata(path).ok().map(|m| m.len());

        Self {
            absolute_path: path.to_path_buf(),
            file_name,
            extension,
            size_bytes,
        }
    }

    /// Use an upload's original name for heuristics while reading from a temp path
    pub fn with_original_name(mut self, original_name: &str) -> Self {
        self.file_name = original_name.to_string();
        self.extension = Path::new(original_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        self
    }
}

/// Coarse file format guessed from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Excel,
    Csv,
    Text,
    Unknown,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Excel => "excel",
            Format::Csv => "csv",
            Format::Text => "text",
            Format::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one detection pass. The score is unnormalized; callers threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    pub score: i32,
    pub reasons: Vec<String>,
    pub vendor_guess: Option<String>,
    pub format: Format,
}

/// A loosely-typed cell value as found in vendor exports
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Missing,
    Number(f64),
    Text(String),
    Timestamp(DateTime<Local>),
}

impl RawValue {
    /// Empty cells become `Missing`
    pub fn from_field(field: Option<&str>) -> Self {
        match field {
            Some(s) if !s.is_empty() => RawValue::Text(s.to_string()),
            _ => RawValue::Missing,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<DateTime<Local>> for RawValue {
    fn from(value: DateTime<Local>) -> Self {
        RawValue::Timestamp(value)
    }
}

/// One row prior to normalization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawReading {
    pub timestamp: RawValue,
    pub temperature: RawValue,
    pub humidity: RawValue,
    pub sensor_id: Option<String>,
}

/// A validated reading.
///
/// Temperature is always a finite parsed number, humidity is either
/// `None` or within `[0, 100]`, and the timestamp is a valid instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub sensor_id: String,
    pub timestamp: DateTime<Local>,
    pub temperature: f64,
    pub humidity: Option<f64>,
}

/// A sensor a job is allowed to attribute files to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSensor {
    pub id: String,
    pub serial_number: String,
}

impl TargetSensor {
    pub fn new(id: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            serial_number: serial_number.into(),
        }
    }
}

/// Parses `ID=SERIAL`
impl std::str::FromStr for TargetSensor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, serial) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ID=SERIAL, got '{}'", s))?;
        let (id, serial) = (id.trim(), serial.trim());
        if id.is_empty() || serial.is_empty() {
            return Err(format!("sensor id and serial must not be empty in '{}'", s));
        }
        Ok(Self::new(id, serial))
    }
}

/// Why a raw reading was dropped during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingTimestamp,
    InvalidTimestamp,
    MissingTemperature,
    InvalidTemperature,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingTimestamp => "missing_timestamp",
            SkipReason::InvalidTimestamp => "invalid_timestamp",
            SkipReason::MissingTemperature => "missing_temperature",
            SkipReason::InvalidTemperature => "invalid_temperature",
        }
    }

    /// Metrics counter name for this skip category
    pub fn counter_name(&self) -> String {
        format!("skip_{}", self.as_str())
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot passed to `on_progress` callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub failed: usize,
    pub percentage: u8,
}

/// Result of one streaming call
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome<T> {
    pub results: Vec<T>,
    pub processed: usize,
    pub failed: usize,
}

/// Cumulative counters of a stream processor instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessorStats {
    pub processed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// One recorded stage timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub name: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Per-job instrumentation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub job_id: String,
    pub file_name: String,
    pub vendor: Option<String>,
    pub format: Option<String>,
    /// In the order stages were first recorded
    pub stages: Vec<StageTiming>,
    pub counters: BTreeMap<String, u64>,
    pub errors: Vec<String>,
}

impl ProcessingMetrics {
    pub fn new(
        job_id: impl Into<String>,
        file_name: impl Into<String>,
        vendor: Option<String>,
        format: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            file_name: file_name.into(),
            vendor,
            format,
            stages: Vec::new(),
            counters: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Record a stage duration; a stage recorded again keeps its position
    pub fn record_stage(&mut self, name: &str, duration_ms: u64) {
        let timing = StageTiming {
            name: name.to_string(),
            duration_ms,
            timestamp: Utc::now(),
        };
        match self.stages.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = timing,
            None => self.stages.push(timing),
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageTiming> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Sum of all recorded stage durations
    pub fn total_time_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }

    /// Per-stage breakdown (duration and share of the total), then counters
    pub fn summary_lines(&self) -> Vec<String> {
        let total_ms = self.total_time_ms();
        let stages = self.stages.iter().map(|timing| {
            let share = if total_ms > 0 {
                (timing.duration_ms as f64 / total_ms as f64 * 100.0).round() as u64
            } else {
                0
            };
            format!("{}: {}ms ({}%)", timing.name, timing.duration_ms, share)
        });
        let counters = self
            .counters
            .iter()
            .map(|(counter, value)| format!("{}: {}", counter, value));

        stages.chain(counters).collect()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Terminal state of one ingested file
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub heuristics: HeuristicResult,
    pub delimiter: char,
    pub readings: Vec<NormalizedReading>,
    pub processed: usize,
    pub failed: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl FileOutcome {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Aggregate over every file of a job
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub files: Vec<FileOutcome>,
    /// Files that failed before yielding an outcome, with the reason
    pub file_errors: Vec<(String, String)>,
    pub total_processed: usize,
    pub total_failed: usize,
    pub total_readings: usize,
}

impl JobOutcome {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    pub fn push_file(&mut self, outcome: FileOutcome) {
        self.total_processed += outcome.processed;
        self.total_failed += outcome.failed;
        self.total_readings += outcome.readings.len();
        self.files.push(outcome);
    }

    pub fn push_file_error(&mut self, file_name: impl Into<String>, reason: impl Into<String>) {
        self.file_errors.push((file_name.into(), reason.into()));
    }

    /// Success rate over processed units (percent)
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            (self.total_processed.saturating_sub(self.total_failed)) as f64
                / self.total_processed as f64
                * 100.0
        }
    }
}
