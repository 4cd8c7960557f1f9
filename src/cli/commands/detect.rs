//! Detect command: score format and vendor guesses without parsing

use crate::cli::args::{DetectArgs, OutputFormat};
use crate::cli::commands::shared::{discover_files, load_configuration, setup_logging};
use crate::config::IngestConfig;
use crate::detector::{detect_delimiter, detect_format, is_line_oriented, sample_file};
use crate::models::{FileMeta, HeuristicResult};
use anyhow::Result;
use colored::*;
use serde::Serialize;
use std::path::PathBuf;

/// Detection report for one file
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub heuristics: HeuristicResult,
    pub delimiter: Option<char>,
    pub confident: bool,
}

/// Run detection on one file
pub fn detect_file(meta: &FileMeta, config: &IngestConfig) -> DetectionReport {
    let sample = sample_file(meta, config.sample_bytes);
    let heuristics = detect_format(meta, sample.as_deref());
    let delimiter = sample
        .as_deref()
        .filter(|_| is_line_oriented(heuristics.format))
        .map(|s| detect_delimiter(s) as char);

    DetectionReport {
        path: meta.absolute_path.clone(),
        confident: heuristics.score >= config.min_detection_score,
        heuristics,
        delimiter,
    }
}

pub async fn run_detect(args: &DetectArgs) -> Result<()> {
    setup_logging(&args.common)?;
    let config = load_configuration(&args.common)?;
    let files = discover_files(&args.common.inputs)?;

    let reports: Vec<DetectionReport> = files
        .iter()
        .map(|path| detect_file(&FileMeta::from_path(path), &config))
        .collect();

    match args.common.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Human => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    Ok(())
}

fn print_report(report: &DetectionReport) {
    let score = if report.confident {
        report.heuristics.score.to_string().bright_green().bold()
    } else {
        report.heuristics.score.to_string().bright_yellow().bold()
    };

    println!("\n{}", report.path.display().to_string().bright_white().bold());
    println!("  {} {}", "Format:".bright_cyan(), report.heuristics.format);
    println!("  {} {}", "Score:".bright_cyan(), score);
    println!(
        "  {} {}",
        "Vendor:".bright_cyan(),
        report.heuristics.vendor_guess.as_deref().unwrap_or("unknown")
    );
    if let Some(delimiter) = report.delimiter {
        println!("  {} {:?}", "Delimiter:".bright_cyan(), delimiter);
    }
    for reason in &report.heuristics.reasons {
        println!("    • {}", reason);
    }
}
