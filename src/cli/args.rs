//! Command-line argument definitions for the sensor-log ingester
//!
//! Defines the CLI interface using the clap derive API.

use crate::models::TargetSensor;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the sensor-log ingester
///
/// Detects, parses and normalizes temperature/humidity exports from
/// datalogger vendor software.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sensorlog-ingest",
    version,
    about = "Ingest vendor datalogger exports into normalized temperature/humidity readings",
    long_about = "Detects the vendor and layout of datalogger export files, parses \
                  locale-specific numbers and dates (Brazilian and international formats) \
                  and streams large files with bounded concurrency, reporting per-file \
                  counts of valid, skipped and failed rows."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Score format and vendor guesses for files without parsing them
    Detect(DetectArgs),
    /// Parse and normalize files into readings
    Ingest(IngestArgs),
    /// Count lines in files (fast estimate)
    Count(CountArgs),
}

/// Options shared by every subcommand
#[derive(Debug, Clone, ClapArgs)]
pub struct CommonArgs {
    /// Files or directories to read; directories are searched recursively
    #[arg(value_name = "PATH", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Configuration file (TOML)
    ///
    /// Defaults to <config dir>/sensorlog-ingest/config.toml when present.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Output format for results
    #[arg(long = "output-format", value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Enable verbose logging output
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors. Overrides verbose settings.
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl CommonArgs {
    /// Get the log level based on verbosity settings
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Progress bars are hidden in quiet mode and for machine-readable output
    pub fn show_progress(&self) -> bool {
        !self.quiet && matches!(self.output_format, OutputFormat::Human)
    }
}

#[derive(Debug, Clone, Parser)]
pub struct DetectArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, Parser)]
pub struct IngestArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Job id used for metrics; generated from the current time when omitted
    #[arg(long = "job-id", value_name = "ID")]
    pub job_id: Option<String>,

    /// Sensor id for rows that carry none
    #[arg(short = 's', long = "sensor-id", value_name = "ID", conflicts_with = "sensors")]
    pub sensor_id: Option<String>,

    /// Target sensor as ID=SERIAL (repeatable); each file is attributed to
    /// the sensor whose serial appears in its name, files matching none fail
    #[arg(long = "sensor", value_name = "ID=SERIAL")]
    pub sensors: Vec<TargetSensor>,

    /// Maximum rows parsed concurrently
    #[arg(long = "concurrency", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Progress cadence in rows
    #[arg(long = "chunk-size", value_name = "N")]
    pub chunk_size: Option<usize>,

    /// Decode files as ISO-8859-1 instead of UTF-8
    #[arg(long = "latin1")]
    pub latin1: bool,

    /// Write normalized readings as JSON lines to this file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
pub struct CountArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON format for scripting
    Json,
}

impl Args {
    /// Get the command to execute, defaulting to help when none given
    pub fn command(&self) -> Option<&Commands> {
        self.command.as_ref()
    }
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Detect(args) => &args.common,
            Commands::Ingest(args) => &args.common,
            Commands::Count(args) => &args.common,
        }
    }
}
