//! Command implementations for the sensor-log ingester CLI
//!
//! Each subcommand lives in its own module:
//! - `detect`: format/vendor scoring without parsing
//! - `ingest`: full parse and normalization with a job summary
//! - `count`: line counts

pub mod count;
pub mod detect;
pub mod ingest;
pub mod shared;

use crate::cli::args::{Args, Commands};
use anyhow::Result;

/// Dispatch to the subcommand handler
pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Detect(detect_args)) => detect::run_detect(&detect_args).await,
        Some(Commands::Ingest(ingest_args)) => ingest::run_ingest(&ingest_args).await,
        Some(Commands::Count(count_args)) => count::run_count(&count_args).await,
        None => Ok(()),
    }
}
