//! Integration tests for the stream processor
//!
//! Exercises line mode and batch mode against temporary files.

pub mod line_mode;

use std::path::PathBuf;
use tempfile::TempDir;

/// Write `lines` (newline-terminated) into a fresh temp file
pub fn write_lines(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}

/// `count` lines of the form `row-<n>`
pub fn numbered_lines(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("row-{}", n)).collect()
}
