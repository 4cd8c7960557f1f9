//! Header-driven column mapping for vendor exports
//!
//! Vendor exports put timestamp, temperature, humidity and sensor id in
//! arbitrary columns with Portuguese or English headers. This module finds
//! the header row, assigns each role a column index and turns data rows into
//! [`RawReading`]s.

use crate::constants::columns::{HUMIDITY, SENSOR, TEMPERATURE, TIMESTAMP};
use crate::models::{RawReading, RawValue};
use crate::normalizer::sanitize_sensor_id;
use crate::processor::text_lines;
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use tracing::debug;

/// Column index for each reading role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub timestamp: Option<usize>,
    pub temperature: Option<usize>,
    pub humidity: Option<usize>,
    pub sensor: Option<usize>,
}

impl ColumnMapping {
    /// Map header fields onto roles.
    ///
    /// Each header is lower-cased and matched by substring against the role
    /// vocabularies, checking timestamp, temperature, humidity, then sensor;
    /// a column takes the first role it matches. When several columns match
    /// the same role the rightmost one wins.
    pub fn detect<S: AsRef<str>>(header_fields: &[S]) -> Self {
        let mut mapping = Self::default();

        for (index, field) in header_fields.iter().enumerate() {
            let header = field
                .as_ref()
                .trim()
                .trim_start_matches('\u{feff}')
                .to_lowercase();
            if header.is_empty() {
                continue;
            }

            if matches_any(&header, TIMESTAMP) {
                mapping.timestamp = Some(index);
            } else if matches_any(&header, TEMPERATURE) {
                mapping.temperature = Some(index);
            } else if matches_any(&header, HUMIDITY) {
                mapping.humidity = Some(index);
            } else if matches_any(&header, SENSOR) {
                mapping.sensor = Some(index);
            }
        }

        mapping
    }

    /// Timestamp and temperature are required; the rest is optional
    pub fn is_usable(&self) -> bool {
        self.timestamp.is_some() && self.temperature.is_some()
    }

    /// Build a raw reading from one data row's fields
    pub fn extract<S: AsRef<str>>(&self, fields: &[S]) -> RawReading {
        let field = |index: Option<usize>| -> Option<&str> {
            index
                .and_then(|i| fields.get(i))
                .map(|f| f.as_ref().trim())
        };

        RawReading {
            timestamp: RawValue::from_field(field(self.timestamp)),
            temperature: RawValue::from_field(field(self.temperature)),
            humidity: RawValue::from_field(field(self.humidity)),
            sensor_id: field(self.sensor).and_then(sanitize_sensor_id),
        }
    }
}

fn matches_any(header: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|candidate| header.contains(candidate))
}

/// Split one delimited line into fields, honouring quotes
pub fn split_record(line: &str, delimiter: u8) -> Result<Vec<String>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    if reader.read_record(&mut record)? {
        Ok(record.iter().map(str::to_string).collect())
    } else {
        Ok(Vec::new())
    }
}

/// Locate the header row among the first `search_lines` lines of a sample.
///
/// Returns the 0-based line index of the first row whose mapping is usable,
/// so preambles (device serial, export date) above the header are skipped.
pub fn find_header(
    sample: &str,
    delimiter: u8,
    search_lines: usize,
) -> Option<(usize, ColumnMapping)> {
    for (index, line) in text_lines(sample).take(search_lines).enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(fields) = split_record(line, delimiter) else {
            continue;
        };
        let mapping = ColumnMapping::detect(&fields);
        if mapping.is_usable() {
            debug!(line = index + 1, ?mapping, "Header row found");
            return Some((index, mapping));
        }
    }
    None
}
