//! Application constants for sensor-log ingestion
//!
//! Default tuning values, the vendor keyword table and the header
//! vocabularies used by format detection and column mapping.

// =============================================================================
// Stream Processor Defaults
// =============================================================================

/// Lines per progress tick (line mode) or per batch (batch mode)
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Read buffer size for file streams (64KB)
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Maximum line-processor calls in flight at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Maximum characters of an offending line echoed into error logs
pub const LOG_LINE_PREVIEW_CHARS: usize = 100;

// =============================================================================
// Format Detection
// =============================================================================

/// Bytes read from the head of a file for content heuristics
pub const DEFAULT_SAMPLE_BYTES: usize = 4096;

/// Heuristic score contributions
pub mod scores {
    pub const EXTENSION_CSV: i32 = 10;
    pub const EXTENSION_EXCEL: i32 = 10;
    pub const EXTENSION_TEXT: i32 = 5;
    pub const VENDOR_HINT: i32 = 4;
    pub const HEADER_KEYWORD: i32 = 3;
}

/// Filename keyword to vendor name, checked in order; the first hit wins.
pub const VENDOR_KEYWORDS: &[(&str, &str)] = &[
    ("elitech", "Elitech"),
    ("novus", "Novus"),
    ("instrutemp", "Instrutemp"),
    ("testo", "Testo"),
    ("dlog", "GenericDatalogger"),
];

/// Header line patterns (case-insensitive)
pub const HEADER_TEMPERATURE_PATTERN: &str = r"(?i)temper";
pub const HEADER_HUMIDITY_PATTERN: &str = r"(?i)(umid|humid)";
pub const HEADER_DATETIME_PATTERN: &str = r"(?i)(data.*hora|date.*time)";

/// Candidate field delimiters, in tie-break order
pub const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

/// Lines inspected when guessing the delimiter
pub const DELIMITER_SAMPLE_LINES: usize = 10;

// =============================================================================
// Normalization
// =============================================================================

/// `dd/MM/yyyy[ T]HH:mm[:ss]`
pub const DAY_FIRST_TIMESTAMP_PATTERN: &str =
    r"^(\d{2})/(\d{2})/(\d{4})[ T](\d{2}):(\d{2})(?::(\d{2}))?";

/// `yyyy-MM-dd[ T]HH:mm[:ss]`
pub const ISO_LIKE_TIMESTAMP_PATTERN: &str =
    r"^(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2})(?::(\d{2}))?";

/// Sensor id used when neither the row nor the caller supplies one
pub const UNKNOWN_SENSOR_ID: &str = "unknown";

/// Invisible characters stripped from sensor ids after NFKC: control,
/// format (zero-width, BOM), private-use and unassigned code points
pub const SENSOR_ID_INVISIBLE_PATTERN: &str = r"\p{C}";

/// Valid relative humidity range (percent)
pub const HUMIDITY_MIN: f64 = 0.0;
pub const HUMIDITY_MAX: f64 = 100.0;

// =============================================================================
// Column Mapping
// =============================================================================

/// Header vocabularies (Portuguese and English vendor exports)
pub mod columns {
    pub const TIMESTAMP: &[&str] = &[
        "timestamp",
        "data",
        "hora",
        "time",
        "date",
        "data_hora",
        "datetime",
        "data/hora",
        "data e hora",
        "timestamp_leitura",
        "leitura_data",
    ];

    pub const TEMPERATURE: &[&str] = &[
        "temperatura",
        "temperature",
        "temp",
        "temp_celsius",
        "temp_c",
        "temperatura_c",
    ];

    pub const HUMIDITY: &[&str] = &[
        "umidade",
        "humidity",
        "hum",
        "hum_rel",
        "umidade_relativa",
        "humidity_rel",
    ];

    pub const SENSOR: &[&str] = &[
        "sensor",
        "sensor_id",
        "serial",
        "serial_number",
        "numero_serie",
        "sensor_serial",
        "id_sensor",
    ];
}

// =============================================================================
// Metrics
// =============================================================================

/// Job records retained before oldest-inserted eviction kicks in
pub const DEFAULT_METRICS_CAPACITY: usize = 1000;

/// Stage names recorded by the ingestion pipeline
pub mod stages {
    pub const DETECT: &str = "detect";
    pub const PARSE: &str = "parse";
    pub const SINK: &str = "sink";
}

/// Counter names recorded by the ingestion pipeline
pub mod counters {
    pub const LINES_TOTAL: &str = "lines_total";
    pub const READINGS_VALID: &str = "readings_valid";
    pub const READINGS_SKIPPED: &str = "readings_skipped";
    pub const LINES_FAILED: &str = "lines_failed";
    pub const READINGS_WRITTEN: &str = "readings_written";
}

// =============================================================================
// Configuration Files
// =============================================================================

pub const CONFIG_DIR_NAME: &str = "sensorlog-ingest";
pub const CONFIG_FILE_NAME: &str = "config.toml";
