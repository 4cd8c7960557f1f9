//! Format and vendor detection for uploaded datalogger exports.
//!
//! Detection is a scoring pass, not a decision: extension, filename and
//! header content each add to an unnormalized score with a human-readable
//! reason, and the caller decides what score is good enough.

use crate::constants::{
    CANDIDATE_DELIMITERS, DEFAULT_SAMPLE_BYTES, DELIMITER_SAMPLE_LINES,
    HEADER_DATETIME_PATTERN, HEADER_HUMIDITY_PATTERN, HEADER_TEMPERATURE_PATTERN,
    VENDOR_KEYWORDS, scores,
};
use crate::models::{FileMeta, Format, HeuristicResult};
use crate::processor::text_lines;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::sync::LazyLock;
use tracing::debug;

/// Header keyword checks, each scored independently
static HEADER_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (HEADER_TEMPERATURE_PATTERN, "Header line contains temperature"),
        (HEADER_HUMIDITY_PATTERN, "Header line contains humidity"),
        (HEADER_DATETIME_PATTERN, "Header seems to have date/time"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).expect("valid header pattern"), reason))
    .collect()
});

/// Read up to `max_bytes` from the start of the file.
///
/// Returns `None` for empty files and on any I/O error; sampling failures
/// only weaken detection, they never abort it.
pub fn sample_file(meta: &FileMeta, max_bytes: usize) -> Option<Vec<u8>> {
    let mut file = match File::open(&meta.absolute_path) {
        Ok(file) => file,
        Err(e) => {
            debug!(
                "Could not open {} for sampling: {}",
                meta.absolute_path.display(),
                e
            );
            return None;
        }
    };

    let size = file.metadata().ok()?.len();
    if size == 0 {
        return None;
    }

    let to_read = (max_bytes as u64).min(size) as usize;
    let mut buf = vec![0u8; to_read];
    let mut filled = 0;
    while filled < to_read {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => {
                debug!(
                    "Sampling read failed for {}: {}",
                    meta.absolute_path.display(),
                    e
                );
                return None;
            }
        }
    }
    buf.truncate(filled);

    Some(buf)
}

/// [`sample_file`] with the default sample size
pub fn sample_file_default(meta: &FileMeta) -> Option<Vec<u8>> {
    sample_file(meta, DEFAULT_SAMPLE_BYTES)
}

/// Score format and vendor guesses for a file. Deterministic and side-effect free.
pub fn detect_format(meta: &FileMeta, sample: Option<&[u8]>) -> HeuristicResult {
    let mut reasons = Vec::new();
    let mut score = 0;

    let ext = meta.extension.to_lowercase();
    let format = match ext.as_str() {
        ".csv" => {
            score += scores::EXTENSION_CSV;
            reasons.push("Extension .csv".to_string());
            Format::Csv
        }
        ".xls" | ".xlsx" => {
            score += scores::EXTENSION_EXCEL;
            reasons.push(format!("Extension {}", ext));
            Format::Excel
        }
        ".txt" => {
            score += scores::EXTENSION_TEXT;
            reasons.push("Extension .txt".to_string());
            Format::Text
        }
        _ => Format::Unknown,
    };

    let name_lower = meta.file_name.to_lowercase();
    let vendor_guess = VENDOR_KEYWORDS
        .iter()
        .find(|(key, _)| name_lower.contains(key))
        .map(|(key, vendor)| {
            score += scores::VENDOR_HINT;
            reasons.push(format!("Filename contains vendor hint: {}", key));
            vendor.to_string()
        });

    if let (Format::Csv, Some(sample)) = (format, sample) {
        let text = String::from_utf8_lossy(sample);
        let first_line = first_line(&text);
        for (rule, reason) in HEADER_RULES.iter() {
            if rule.is_match(first_line) {
                score += scores::HEADER_KEYWORD;
                reasons.push(reason.to_string());
            }
        }
    }

    HeuristicResult {
        score,
        reasons,
        vendor_guess,
        format,
    }
}

/// Whether the format can be streamed line by line
pub fn is_line_oriented(format: Format) -> bool {
    matches!(format, Format::Csv | Format::Text)
}

/// Guess the field delimiter of delimited text from a sample.
///
/// Each candidate is scored over the first few non-empty lines. Its column
/// count is the most frequent split count above one (ties go to the wider
/// split), and the score is the share of lines with exactly that count times
/// the count, so preamble lines and decimal commas weigh little. Candidates
/// that never split a line score zero. Falls back to `,`.
pub fn detect_delimiter(sample: &[u8]) -> u8 {
    let text = String::from_utf8_lossy(sample);
    let lines: Vec<&str> = text_lines(&text)
        .filter(|l| !l.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();

    if lines.is_empty() {
        return b',';
    }

    let mut best = (b',', 0.0_f64);
    for &delimiter in CANDIDATE_DELIMITERS {
        let mut frequencies: BTreeMap<usize, usize> = BTreeMap::new();
        for line in &lines {
            let columns = line.split(delimiter as char).count();
            if columns > 1 {
                *frequencies.entry(columns).or_insert(0) += 1;
            }
        }

        let Some((columns, consistent)) = frequencies
            .into_iter()
            .max_by_key(|&(columns, lines)| (lines, columns))
        else {
            continue;
        };

        let score = consistent as f64 / lines.len() as f64 * columns as f64;
        if score > best.1 {
            best = (delimiter, score);
        }
    }

    debug!(delimiter = ?(best.0 as char), score = best.1, "Delimiter detected");
    best.0
}

fn first_line(text: &str) -> &str {
    text_lines(text).next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn meta(name: &str) -> FileMeta {
        let ext = std::path::Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        FileMeta::new(format!("/nonexistent/{}", name), name, ext)
    }

    #[test]
    fn test_vendor_and_extension_scoring() {
        let result = detect_format(&meta("ELITECH_log.csv"), None);
        assert_eq!(result.format, Format::Csv);
        assert_eq!(result.vendor_guess.as_deref(), Some("Elitech"));
        assert!(result.score >= 14);
        assert_eq!(
            result.reasons,
            vec![
                "Extension .csv".to_string(),
                "Filename contains vendor hint: elitech".to_string()
            ]
        );
    }

    #[test]
    fn test_excel_and_text_extensions() {
        let xlsx = detect_format(&meta("logger.xlsx"), None);
        assert_eq!(xlsx.format, Format::Excel);
        assert_eq!(xlsx.score, 10);
        assert_eq!(xlsx.reasons, vec!["Extension .xlsx".to_string()]);

        let txt = detect_format(&meta("export.txt"), None);
        assert_eq!(txt.format, Format::Text);
        assert_eq!(txt.score, 5);
    }

    #[test]
    fn test_unknown_extension_scores_zero() {
        let result = detect_format(&meta("readings.dat"), None);
        assert_eq!(result.format, Format::Unknown);
        assert_eq!(result.score, 0);
        assert!(result.reasons.is_empty());
        assert!(result.vendor_guess.is_none());
    }

    #[test]
    fn test_first_vendor_in_table_order_wins() {
        // Both "novus" and "testo" appear; novus precedes testo in the table
        let result = detect_format(&meta("testo_vs_novus.csv"), None);
        assert_eq!(result.vendor_guess.as_deref(), Some("Novus"));
        assert_eq!(result.score, 14);
    }

    #[test]
    fn test_header_rules_are_additive() {
        let sample = b"Data e Hora;Temperatura;Umidade\r\n01/02/2024 10:00;5,5;40\r\n";
        let result = detect_format(&meta("log.csv"), Some(sample));
        assert_eq!(result.score, 10 + 3 + 3 + 3);
        assert!(
            result
                .reasons
                .contains(&"Header line contains humidity".to_string())
        );
    }

    #[test]
    fn test_header_rules_only_for_csv() {
        let sample = b"Date Time\tTemperature\tHumidity\n";
        let result = detect_format(&meta("log.txt"), Some(sample));
        assert_eq!(result.score, 5);
    }

    #[test]
    fn test_header_rules_use_first_line_only() {
        let sample = b"serial,value\ntemperature,humidity\n";
        let result = detect_format(&meta("log.csv"), Some(sample));
        assert_eq!(result.score, 10);
    }

    #[test]
    fn test_sample_file_reads_prefix() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[b'x'; 10_000]).unwrap();
        let meta = FileMeta::from_path(temp.path());

        assert_eq!(sample_file(&meta, 4096).unwrap().len(), 4096);
        assert_eq!(sample_file(&meta, 20_000).unwrap().len(), 10_000);
    }

    #[test]
    fn test_sample_file_empty_and_missing() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, b"").unwrap();

        assert!(sample_file_default(&FileMeta::from_path(&empty)).is_none());
        let missing = FileMeta::from_path(&dir.path().join("missing.csv"));
        assert!(sample_file_default(&missing).is_none());
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter(b"a;b;c\n1;2;3\n4;5;6\n"), b';');
        assert_eq!(detect_delimiter(b"a\tb\n1\t2\n"), b'\t');
        assert_eq!(detect_delimiter(b"a,b,c\n1,2,3\n"), b',');
        assert_eq!(detect_delimiter(b"single column\n"), b',');
        assert_eq!(detect_delimiter(b""), b',');
    }

    #[test]
    fn test_detect_delimiter_decimal_commas() {
        let sample = b"Data;Temp;Umid\n01/02/2024 10:00;5,5;40,1\n01/02/2024 10:05;5,6;40,3\n";
        assert_eq!(detect_delimiter(sample), b';');
    }

    #[test]
    fn test_detect_delimiter_ignores_preamble() {
        let sample = "Device: RC-5+\nSerial: EL0001\n\nData;Temp;Umid\n\
                      15/03/2024 14:30;23,1;150\n15/03/2024 14:31;;60\nnope;22,0;60\n";
        assert_eq!(detect_delimiter(sample.as_bytes()), b';');
    }

    #[test]
    fn test_line_oriented_formats() {
        assert!(is_line_oriented(Format::Csv));
        assert!(is_line_oriented(Format::Text));
        assert!(!is_line_oriented(Format::Excel));
        assert!(!is_line_oriented(Format::Unknown));
    }
}
