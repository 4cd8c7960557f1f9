//! Locale-tolerant number and timestamp parsing plus per-reading validation.
//!
//! Datalogger exports mix decimal commas and points, thousands separators
//! and day-first dates. Everything here is deliberately forgiving: a value
//! that cannot be read yields `None` (or a [`SkipReason`]) and never an error.

use crate::constants::{
    DAY_FIRST_TIMESTAMP_PATTERN, HUMIDITY_MAX, HUMIDITY_MIN, ISO_LIKE_TIMESTAMP_PATTERN,
    SENSOR_ID_INVISIBLE_PATTERN, UNKNOWN_SENSOR_ID,
};
use crate::models::{NormalizedReading, RawReading, RawValue, SkipReason};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

static DAY_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DAY_FIRST_TIMESTAMP_PATTERN).expect("valid timestamp pattern"));

static ISO_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ISO_LIKE_TIMESTAMP_PATTERN).expect("valid timestamp pattern"));

static SENSOR_ID_INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(SENSOR_ID_INVISIBLE_PATTERN).expect("valid sensor id pattern")
});

/// Longest leading float, as `parseFloat` would accept it
static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("valid float pattern")
});

/// Parse a number that may use either `.` or `,` as decimal or thousands separator.
///
/// The heuristic, applied in order:
/// 1. drop every `.` immediately followed by exactly three digits and then a
///    non-digit or the end of the string;
/// 2. same for `,` on the result of step 1;
/// 3. replace the first remaining `,` with `.`;
/// 4. parse the longest leading float.
///
/// `"1.234"` therefore always reads as 1234; the format carries no way to
/// tell it apart from 1.234.
pub fn parse_number_locale(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Missing => None,
        RawValue::Number(n) => n.is_finite().then_some(*n),
        RawValue::Text(s) => parse_number_str(s),
        RawValue::Timestamp(_) => None,
    }
}

/// String form of [`parse_number_locale`]
pub fn parse_number_str(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_points = strip_thousands_separator(trimmed, '.');
    let without_commas = strip_thousands_separator(&without_points, ',');
    let cleaned = without_commas.replacen(',', ".", 1);

    FLOAT_PREFIX
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Remove `separator` wherever it is followed by exactly three digits and
/// then a non-digit or the end of input.
fn strip_thousands_separator(input: &str, separator: char) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());

    for (i, &c) in chars.iter().enumerate() {
        if c == separator && is_thousands_group(&chars[i + 1..]) {
            continue;
        }
        out.push(c);
    }

    out
}

fn is_thousands_group(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(|c| c.is_ascii_digit())
        && rest.get(3).is_none_or(|c| !c.is_ascii_digit())
}

/// Parse a timestamp from the formats dataloggers commonly export.
///
/// A "native" parse is tried first (RFC 3339, RFC 2822, ISO date-time
/// without zone as local time, ISO date as UTC midnight). Then, in order,
/// `dd/MM/yyyy[ T]HH:mm[:ss]` and `yyyy-MM-dd[ T]HH:mm[:ss]` as local time,
/// seconds defaulting to zero. Components that do not form a valid local
/// instant fall through to the next pattern.
pub fn parse_timestamp_flexible(raw: &RawValue) -> Option<DateTime<Local>> {
    match raw {
        RawValue::Timestamp(ts) => Some(*ts),
        RawValue::Text(s) => parse_timestamp_str(s),
        RawValue::Missing | RawValue::Number(_) => None,
    }
}

/// String form of [`parse_timestamp_flexible`]
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Local>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(native) = parse_native(trimmed) {
        return Some(native);
    }

    if let Some(caps) = DAY_FIRST.captures(trimmed) {
        let field = |i: usize| caps.get(i).map_or(0, |m| m.as_str().parse::<u32>().unwrap_or(0));
        if let Some(ts) = local_instant(
            field(3) as i32,
            field(2),
            field(1),
            field(4),
            field(5),
            field(6),
        ) {
            return Some(ts);
        }
    }

    if let Some(caps) = ISO_LIKE.captures(trimmed) {
        let field = |i: usize| caps.get(i).map_or(0, |m| m.as_str().parse::<u32>().unwrap_or(0));
        if let Some(ts) = local_instant(
            field(1) as i32,
            field(2),
            field(3),
            field(4),
            field(5),
            field(6),
        ) {
            return Some(ts);
        }
    }

    None
}

fn parse_native(s: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Local));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).with_timezone(&Local));
    }
    None
}

fn local_instant(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<DateTime<Local>> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Local.from_local_datetime(&naive).earliest()
}

/// Canonical form of a sensor id as typed into vendor software.
///
/// NFKC-normalizes (full-width digits, ligatures) and strips invisible
/// characters such as zero-width spaces and BOMs. `None` when nothing
/// visible remains.
pub fn sanitize_sensor_id(raw: &str) -> Option<String> {
    let normalized: String = raw.trim().nfkc().collect();
    let visible = SENSOR_ID_INVISIBLE.replace_all(&normalized, "");
    let visible = visible.trim();
    (!visible.is_empty()).then(|| visible.to_string())
}

/// Validate a raw reading, reporting why it was dropped.
///
/// Humidity never rejects a reading: absent, unparsable or out-of-range
/// values become `None`.
pub fn classify_reading(
    raw: &RawReading,
    fallback_sensor_id: Option<&str>,
) -> Result<NormalizedReading, SkipReason> {
    let timestamp = match &raw.timestamp {
        value if is_blank(value) => return Err(SkipReason::MissingTimestamp),
        value => parse_timestamp_flexible(value).ok_or(SkipReason::InvalidTimestamp)?,
    };

    let temperature = match &raw.temperature {
        value if is_blank(value) => return Err(SkipReason::MissingTemperature),
        value => parse_number_locale(value).ok_or(SkipReason::InvalidTemperature)?,
    };

    let humidity = parse_number_locale(&raw.humidity)
        .filter(|h| (HUMIDITY_MIN..=HUMIDITY_MAX).contains(h));

    let sensor_id = raw
        .sensor_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(fallback_sensor_id.filter(|s| !s.is_empty()))
        .unwrap_or(UNKNOWN_SENSOR_ID)
        .to_string();

    Ok(NormalizedReading {
        sensor_id,
        timestamp,
        temperature,
        humidity,
    })
}

/// Normalize a raw reading, or `None` when it cannot be used
pub fn normalize_reading(
    raw: &RawReading,
    fallback_sensor_id: Option<&str>,
) -> Option<NormalizedReading> {
    match classify_reading(raw, fallback_sensor_id) {
        Ok(reading) => Some(reading),
        Err(reason) => {
            debug!(reason = %reason, "normalize_reading dropped row");
            None
        }
    }
}

fn is_blank(value: &RawValue) -> bool {
    match value {
        RawValue::Missing => true,
        RawValue::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}
