//! Count command: fast line counts for input files

use crate::cli::args::{CountArgs, OutputFormat};
use crate::cli::commands::shared::{discover_files, setup_logging};
use crate::processor::estimate_file_line_count;
use anyhow::{Context, Result};
use colored::*;

pub async fn run_count(args: &CountArgs) -> Result<()> {
    setup_logging(&args.common)?;
    let files = discover_files(&args.common.inputs)?;

    let mut counts = Vec::with_capacity(files.len());
    for path in &files {
        let lines = estimate_file_line_count(path)
            .await
            .with_context(|| format!("Failed to count lines in {}", path.display()))?;
        counts.push((path, lines));
    }

    match args.common.output_format {
        OutputFormat::Json => {
            let value: Vec<serde_json::Value> = counts
                .iter()
                .map(|(path, lines)| serde_json::json!({ "path": path, "lines": lines }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Human => {
            for (path, lines) in &counts {
                println!("{:>10}  {}", lines.to_string().bright_white().bold(), path.display());
            }
            let total: usize = counts.iter().map(|(_, lines)| lines).sum();
            println!("{:>10}  {}", total.to_string().bright_green().bold(), "total".bright_cyan());
        }
    }

    Ok(())
}
