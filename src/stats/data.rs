//! Data structures for modem line statistics.

use chrono::{NaiveDateTime, Timelike};
use std::fmt;

/// Timestamp format used in both renderings (minute precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Column/label names in record order, timestamp first.
pub const FIELD_LABELS: [&str; 20] = [
    "Timestamp",
    "Uptime",
    "Reset Times",
    "Link Times",
    "DS Actual Rate",
    "DS Attainable Rate",
    "DS PSD",
    "NE Attenuation",
    "NE SNR Margin",
    "NE Rcvd Cells",
    "NE Xmitted Cells",
    "NE CRC Count",
    "NE ES Count",
    "US Actual Rate",
    "US Attainable Rate",
    "US PSD",
    "FE Attenuation",
    "FE SNR Margin",
    "FE CRC Count",
    "FE ES Count",
];

/// Unparsed status content as served by the modem.
///
/// When several status pages are fetched per poll their bodies are
/// concatenated in request order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawStatus {
    body: String,
}

impl RawStatus {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Append another page body.
    pub fn push_page(&mut self, page: &str) {
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(page);
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }
}

/// Link uptime as reported by the modem, `hours:minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uptime {
    total_minutes: u64,
}

impl Uptime {
    /// Build an uptime from hours and minutes.
    pub fn new(hours: u64, minutes: u64) -> Self {
        Self {
            total_minutes: hours * 60 + minutes,
        }
    }

    pub fn hours(&self) -> u64 {
        self.total_minutes / 60
    }

    pub fn minutes(&self) -> u64 {
        self.total_minutes % 60
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.hours(), self.minutes())
    }
}

/// One snapshot of the DSL line at a point in time.
///
/// Rates are in bits per second, PSD/attenuation/margin in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRecord {
    /// Local wall time of the poll, truncated to the minute
    pub timestamp: NaiveDateTime,
    pub uptime: Uptime,
    pub reset_count: u64,
    pub link_count: u64,
    pub ds_actual_rate: u64,
    pub ds_attainable_rate: u64,
    pub ds_psd: f64,
    pub ne_attenuation: f64,
    pub ne_snr_margin: f64,
    pub ne_rx_cells: u64,
    pub ne_tx_cells: u64,
    pub ne_crc_count: u64,
    pub ne_es_count: u64,
    pub us_actual_rate: u64,
    pub us_attainable_rate: u64,
    pub us_psd: f64,
    pub fe_attenuation: f64,
    pub fe_snr_margin: f64,
    pub fe_crc_count: u64,
    pub fe_es_count: u64,
}

impl StatsRecord {
    /// Rendered values, in the same order as [`FIELD_LABELS`].
    pub fn values(&self) -> [String; 20] {
        [
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.uptime.to_string(),
            self.reset_count.to_string(),
            self.link_count.to_string(),
            self.ds_actual_rate.to_string(),
            self.ds_attainable_rate.to_string(),
            format_db(self.ds_psd),
            format_db(self.ne_attenuation),
            format_db(self.ne_snr_margin),
            self.ne_rx_cells.to_string(),
            self.ne_tx_cells.to_string(),
            self.ne_crc_count.to_string(),
            self.ne_es_count.to_string(),
            self.us_actual_rate.to_string(),
            self.us_attainable_rate.to_string(),
            format_db(self.us_psd),
            format_db(self.fe_attenuation),
            format_db(self.fe_snr_margin),
            self.fe_crc_count.to_string(),
            self.fe_es_count.to_string(),
        ]
    }

    /// Label/value pairs in record order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, String)> {
        FIELD_LABELS.into_iter().zip(self.values())
    }
}

/// Truncate a wall time to minute precision.
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn format_db(value: f64) -> String {
    format!("{:.1}", value)
}
