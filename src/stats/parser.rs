//! Label-driven extraction of line statistics from modem status pages.
//!
//! Status pages are loosely structured HTML or plain text. Instead of relying
//! on positions, the page is normalised (markup dropped, entities decoded,
//! whitespace collapsed) and every statistic is looked up by its label. The
//! value is the first token after the label, optionally preceded by `:` or
//! `=`. A unit such as `dB` or `kbps` may be attached to the number or follow
//! it as the next token; rates are scaled to bits per second.

use crate::error::{LoggerError, Result};
use crate::stats::data::{truncate_to_minute, RawStatus, StatsRecord, Uptime};
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;

/// A statistic: its record name and the label the modem prints for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatField {
    pub name: &'static str,
    pub label: &'static str,
}

impl StatField {
    const fn new(name: &'static str, label: &'static str) -> Self {
        Self { name, label }
    }
}

pub const UPTIME: StatField = StatField::new("Uptime", "System Uptime");
pub const RESET_TIMES: StatField = StatField::new("Reset Times", "Xdsl Reset Times");
pub const LINK_TIMES: StatField = StatField::new("Link Times", "Xdsl Link Times");
pub const DS_ACTUAL: StatField = StatField::new("DS Actual Rate", "DS Actual Rate");
pub const DS_ATTAINABLE: StatField = StatField::new("DS Attainable Rate", "DS Attainable Rate");
pub const DS_PSD: StatField = StatField::new("DS PSD", "DS actual PSD");
pub const NE_ATTENUATION: StatField = StatField::new("NE Attenuation", "NE Current Attenuation");
pub const NE_SNR_MARGIN: StatField = StatField::new("NE SNR Margin", "Cur SNR Margin");
pub const NE_RX_CELLS: StatField = StatField::new("NE Rcvd Cells", "NE Rcvd Cells");
pub const NE_TX_CELLS: StatField = StatField::new("NE Xmitted Cells", "NE Xmitted Cells");
pub const NE_CRC_COUNT: StatField = StatField::new("NE CRC Count", "NE CRC Count");
pub const NE_ES_COUNT: StatField = StatField::new("NE ES Count", "NE ES Count");
pub const US_ACTUAL: StatField = StatField::new("US Actual Rate", "US Actual Rate");
pub const US_ATTAINABLE: StatField = StatField::new("US Attainable Rate", "US Attainable Rate");
pub const US_PSD: StatField = StatField::new("US PSD", "US actual PSD");
pub const FE_ATTENUATION: StatField = StatField::new("FE Attenuation", "Far Current Attenuation");
pub const FE_SNR_MARGIN: StatField = StatField::new("FE SNR Margin", "Far SNR Margin");
pub const FE_CRC_COUNT: StatField = StatField::new("FE CRC Count", "FE CRC Count");
pub const FE_ES_COUNT: StatField = StatField::new("FE ES Count", "FE ES Count");

/// Every parsed statistic in record order.
pub const ALL_FIELDS: [StatField; 19] = [
    UPTIME,
    RESET_TIMES,
    LINK_TIMES,
    DS_ACTUAL,
    DS_ATTAINABLE,
    DS_PSD,
    NE_ATTENUATION,
    NE_SNR_MARGIN,
    NE_RX_CELLS,
    NE_TX_CELLS,
    NE_CRC_COUNT,
    NE_ES_COUNT,
    US_ACTUAL,
    US_ATTAINABLE,
    US_PSD,
    FE_ATTENUATION,
    FE_SNR_MARGIN,
    FE_CRC_COUNT,
    FE_ES_COUNT,
];

lazy_static! {
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern");
    static ref TAG: Regex = Regex::new(r"<[/!?]?[A-Za-z][^>]*>").expect("valid tag pattern");
    static ref ENTITY: Regex =
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z]+);").expect("valid entity pattern");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace pattern");
    static ref LABEL_PATTERNS: HashMap<&'static str, Regex> = ALL_FIELDS
        .iter()
        .map(|field| (field.label, label_pattern(field.label)))
        .collect();
}

/// Words of the label may be separated by any amount of whitespace.
fn label_pattern(label: &str) -> Regex {
    let words: Vec<String> = label.split_whitespace().map(regex::escape).collect();
    Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s*"))).expect("valid label pattern")
}

/// Reduce a status page to plain single-spaced text.
pub fn normalize(raw: &str) -> String {
    let without_comments = COMMENT.replace_all(raw, " ");
    let without_tags = TAG.replace_all(&without_comments, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        let decoded = match name.to_ascii_lowercase().as_str() {
            "nbsp" => Some(' '),
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            other => {
                if let Some(hex) = other.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = other.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        decoded
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
}

/// Parser turning a [`RawStatus`] into a [`StatsRecord`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsParser;

impl StatsParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse every statistic out of `raw`, stamping the record with
    /// `timestamp` truncated to the minute.
    ///
    /// Fails on the first field (in record order) that is missing or
    /// malformed; no partial record is ever returned.
    pub fn parse(&self, raw: &RawStatus, timestamp: NaiveDateTime) -> Result<StatsRecord> {
        let text = normalize(raw.as_str());
        let page = Extractor { text: &text };

        Ok(StatsRecord {
            timestamp: truncate_to_minute(timestamp),
            uptime: page.uptime(&UPTIME)?,
            reset_count: page.count(&RESET_TIMES)?,
            link_count: page.count(&LINK_TIMES)?,
            ds_actual_rate: page.rate(&DS_ACTUAL)?,
            ds_attainable_rate: page.rate(&DS_ATTAINABLE)?,
            ds_psd: page.decibel(&DS_PSD)?,
            ne_attenuation: page.decibel(&NE_ATTENUATION)?,
            ne_snr_margin: page.decibel(&NE_SNR_MARGIN)?,
            ne_rx_cells: page.count(&NE_RX_CELLS)?,
            ne_tx_cells: page.count(&NE_TX_CELLS)?,
            ne_crc_count: page.count(&NE_CRC_COUNT)?,
            ne_es_count: page.count(&NE_ES_COUNT)?,
            us_actual_rate: page.rate(&US_ACTUAL)?,
            us_attainable_rate: page.rate(&US_ATTAINABLE)?,
            us_psd: page.decibel(&US_PSD)?,
            fe_attenuation: page.decibel(&FE_ATTENUATION)?,
            fe_snr_margin: page.decibel(&FE_SNR_MARGIN)?,
            fe_crc_count: page.count(&FE_CRC_COUNT)?,
            fe_es_count: page.count(&FE_ES_COUNT)?,
        })
    }
}

/// Units a modem may print after a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    /// Bits per second multiplier
    Rate(u64),
    Decibel,
}

impl Unit {
    fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "bps" | "b/s" => Some(Unit::Rate(1)),
            "kbps" | "kb/s" => Some(Unit::Rate(1_000)),
            "mbps" | "mb/s" => Some(Unit::Rate(1_000_000)),
            "db" => Some(Unit::Decibel),
            _ => None,
        }
    }
}

/// A value token split into its number and unit.
struct Reading<'a> {
    token: &'a str,
    number: &'a str,
    unit: Option<Unit>,
}

struct Extractor<'a> {
    text: &'a str,
}

impl<'a> Extractor<'a> {
    /// Tokens following the field's label.
    fn tokens(&self, field: &StatField) -> Result<std::str::SplitWhitespace<'a>> {
        let pattern = LABEL_PATTERNS
            .get(field.label)
            .ok_or_else(|| LoggerError::parse_error(field.name, "no label pattern registered"))?;
        let found = pattern.find(self.text).ok_or_else(|| {
            LoggerError::parse_error(field.name, format!("label '{}' not found", field.label))
        })?;

        let text: &'a str = self.text;
        let rest = text[found.end()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '=');
        Ok(rest.split_whitespace())
    }

    fn token(&self, field: &StatField) -> Result<&'a str> {
        self.tokens(field)?
            .next()
            .ok_or_else(|| LoggerError::parse_error(field.name, "no value after label"))
    }

    /// The value and its unit, attached (`6dB`) or as the next token (`6 dB`).
    fn reading(&self, field: &StatField) -> Result<Reading<'a>> {
        let mut tokens = self.tokens(field)?;
        let token = tokens
            .next()
            .ok_or_else(|| LoggerError::parse_error(field.name, "no value after label"))?;
        let (number, attached) = split_unit(field, token)?;
        let unit = if attached.is_empty() {
            tokens.next().and_then(Unit::from_word)
        } else {
            Some(Unit::from_word(attached).ok_or_else(|| {
                LoggerError::parse_error(field.name, format!("unknown unit in '{}'", token))
            })?)
        };
        Ok(Reading {
            token,
            number,
            unit,
        })
    }

    fn count(&self, field: &StatField) -> Result<u64> {
        let reading = self.reading(field)?;
        if reading.unit.is_some() {
            return Err(LoggerError::parse_error(
                field.name,
                format!("'{}' is not a plain count", reading.token),
            ));
        }
        reading.number.parse::<u64>().map_err(|_| {
            LoggerError::parse_error(field.name, format!("'{}' is not a count", reading.token))
        })
    }

    /// Bits per second. A missing unit means the value is already in bps.
    fn rate(&self, field: &StatField) -> Result<u64> {
        let reading = self.reading(field)?;
        let invalid = || {
            LoggerError::parse_error(field.name, format!("'{}' is not a rate", reading.token))
        };
        let scale = match reading.unit {
            None => 1,
            Some(Unit::Rate(scale)) => scale,
            Some(Unit::Decibel) => return Err(invalid()),
        };

        match reading.number.parse::<u64>() {
            Ok(value) => value.checked_mul(scale).ok_or_else(invalid),
            Err(_) => match reading.number.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => {
                    Ok((value * scale as f64).round() as u64)
                }
                _ => Err(invalid()),
            },
        }
    }

    fn decibel(&self, field: &StatField) -> Result<f64> {
        let reading = self.reading(field)?;
        if matches!(reading.unit, Some(Unit::Rate(_))) {
            return Err(LoggerError::parse_error(
                field.name,
                format!("'{}' is not a dB value", reading.token),
            ));
        }
        match reading.number.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(LoggerError::parse_error(
                field.name,
                format!("'{}' is not a dB value", reading.token),
            )),
        }
    }

    /// `H...:MM`, with an optional trailing `:SS` that is ignored.
    fn uptime(&self, field: &StatField) -> Result<Uptime> {
        let token = self.token(field)?;
        let invalid = || LoggerError::parse_error(field.name, format!("'{}' is not H:MM", token));

        let mut parts = token.split(':');
        let hours = parts.next().ok_or_else(invalid)?;
        let minutes = parts.next().ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            if seconds.len() != 2 || !seconds.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
        }
        if parts.next().is_some() || minutes.len() != 2 {
            return Err(invalid());
        }

        let hours = hours.parse::<u64>().map_err(|_| invalid())?;
        let minutes = minutes.parse::<u64>().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }
        Ok(Uptime::new(hours, minutes))
    }
}

/// Split `68684000bps` / `6dB` into number and unit, rejecting tokens whose
/// remainder is not a plain unit.
fn split_unit<'t>(field: &StatField, token: &'t str) -> Result<(&'t str, &'t str)> {
    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(token.len());
    let (number, unit) = token.split_at(split);
    if number.is_empty() || !unit.chars().all(|c| c.is_ascii_alphabetic() || c == '/') {
        return Err(LoggerError::parse_error(
            field.name,
            format!("'{}' is not numeric", token),
        ));
    }
    Ok((number, unit))
}

/// Whether `raw` mentions any statistic label once normalised.
pub fn mentions_stat_labels(raw: &str) -> bool {
    let text = normalize(raw);
    LABEL_PATTERNS.values().any(|pattern| pattern.is_match(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::data::FIELD_LABELS;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(h, m, 27)
            .unwrap()
    }

    const TEXT_PAGE: &str = "\
System Uptime:52:07
  ---------------------- ATU-R Info (hw: annex A, f/w: annex A/B/C) -----------
   Running Mode            :      17A        State                : SHOWTIME
   DS Actual Rate          : 68684000 bps    US Actual Rate       : 19999000 bps
   DS Attainable Rate      : 84385284 bps    US Attainable Rate   : 27658000 bps
   NE Current Attenuation  :        15 dB    Cur SNR Margin       :        6  dB
   DS actual PSD           :     10.1 dB    US actual PSD        :      -2.5 dB
   NE Rcvd Cells           :    10938888     NE Xmitted Cells     :     2354519
   NE CRC Count            :          12     FE CRC Count         :           3
   NE ES Count             :           4     FE  ES Count         :           1
   Xdsl Reset Times        :           0     Xdsl Link  Times     :           1
  ---------------------- ATU-C Info ---------------------------------------------
   Far Current Attenuation :         0 dB    Far SNR Margin       :        5  dB
   DSLAM CHIPSET VENDOR    : < BDCM >
";

    #[test]
    fn test_field_names_match_record_labels() {
        let names: Vec<&str> = ALL_FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names, FIELD_LABELS[1..].to_vec());
    }

    #[test]
    fn test_parse_text_page() {
        let record = StatsParser::new()
            .parse(&RawStatus::new(TEXT_PAGE), at(9, 30))
            .expect("page should parse");

        let expected_ts = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(record.timestamp, expected_ts);
        assert_eq!(record.uptime, Uptime::new(52, 7));
        assert_eq!(record.reset_count, 0);
        assert_eq!(record.link_count, 1);
        assert_eq!(record.ds_actual_rate, 68_684_000);
        assert_eq!(record.ds_attainable_rate, 84_385_284);
        assert_eq!(record.ds_psd, 10.1);
        assert_eq!(record.ne_attenuation, 15.0);
        assert_eq!(record.ne_snr_margin, 6.0);
        assert_eq!(record.ne_rx_cells, 10_938_888);
        assert_eq!(record.ne_tx_cells, 2_354_519);
        assert_eq!(record.ne_crc_count, 12);
        assert_eq!(record.ne_es_count, 4);
        assert_eq!(record.us_actual_rate, 19_999_000);
        assert_eq!(record.us_attainable_rate, 27_658_000);
        assert_eq!(record.us_psd, -2.5);
        assert_eq!(record.fe_attenuation, 0.0);
        assert_eq!(record.fe_snr_margin, 5.0);
        assert_eq!(record.fe_crc_count, 3);
        assert_eq!(record.fe_es_count, 1);
    }

    #[test]
    fn test_normalize_strips_markup() {
        let html = "<tr><td class=\"l\">NE&nbsp;CRC&nbsp;Count</td>\n<td>:&#32;12</td></tr><!-- 99 -->";
        assert_eq!(normalize(html), "NE CRC Count : 12");
    }

    #[test]
    fn test_normalize_keeps_angle_text() {
        assert_eq!(normalize("VENDOR : < BDCM >"), "VENDOR : < BDCM >");
        assert_eq!(normalize("a &lt;b&gt; &amp; c"), "a <b> & c");
    }

    #[test]
    fn test_missing_field_is_named() {
        let page = TEXT_PAGE.replace("Far SNR Margin", "Far Noise");
        let err = StatsParser::new()
            .parse(&RawStatus::new(page), at(9, 30))
            .unwrap_err();
        match err {
            LoggerError::Parse { field, .. } => assert_eq!(field, "FE SNR Margin"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_value_is_named() {
        let page = TEXT_PAGE.replace("12     FE CRC", "n/a     FE CRC");
        let err = StatsParser::new()
            .parse(&RawStatus::new(page), at(9, 30))
            .unwrap_err();
        match err {
            LoggerError::Parse { field, reason } => {
                assert_eq!(field, "NE CRC Count");
                assert!(reason.contains("n/a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_failing_field_in_record_order() {
        let page = TEXT_PAGE
            .replace("FE  ES Count", "FE Errored")
            .replace("System Uptime", "Boot");
        let err = StatsParser::new()
            .parse(&RawStatus::new(page), at(0, 0))
            .unwrap_err();
        assert!(matches!(err, LoggerError::Parse { field: "Uptime", .. }));
    }

    #[test]
    fn test_uptime_variants() {
        let parse_uptime = |value: &str| {
            let page = TEXT_PAGE.replace("System Uptime:52:07", &format!("System Uptime: {value}"));
            StatsParser::new()
                .parse(&RawStatus::new(page), at(0, 0))
                .map(|r| r.uptime)
        };

        assert_eq!(parse_uptime("0:05").unwrap(), Uptime::new(0, 5));
        assert_eq!(parse_uptime("1234:59:10").unwrap(), Uptime::new(1234, 59));
        assert!(parse_uptime("3:75").is_err());
        assert!(parse_uptime("3:5").is_err());
        assert!(parse_uptime("three").is_err());
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit(&DS_ACTUAL, "68684000bps").unwrap(), ("68684000", "bps"));
        assert_eq!(split_unit(&DS_PSD, "-3.5dB").unwrap(), ("-3.5", "dB"));
        assert_eq!(split_unit(&NE_CRC_COUNT, "7").unwrap(), ("7", ""));
        assert!(split_unit(&NE_CRC_COUNT, "dB").is_err());
        assert!(split_unit(&NE_CRC_COUNT, "7,5").is_err());
    }

    fn parse_ds_rate(value: &str) -> Result<u64> {
        let page = TEXT_PAGE.replace("68684000 bps", value);
        StatsParser::new()
            .parse(&RawStatus::new(page), at(0, 0))
            .map(|r| r.ds_actual_rate)
    }

    #[test]
    fn test_rate_units_are_scaled() {
        assert_eq!(parse_ds_rate("79997kbps").unwrap(), 79_997_000);
        assert_eq!(parse_ds_rate("79997 kbps").unwrap(), 79_997_000);
        assert_eq!(parse_ds_rate("79997&nbsp;Kbps").unwrap(), 79_997_000);
        assert_eq!(parse_ds_rate("79.997 Mbps").unwrap(), 79_997_000);
        assert_eq!(parse_ds_rate("80 Mb/s").unwrap(), 80_000_000);
        assert_eq!(parse_ds_rate("68684000").unwrap(), 68_684_000);
    }

    #[test]
    fn test_mismatched_units_rejected() {
        assert!(parse_ds_rate("79997 dB").is_err());
        assert!(parse_ds_rate("79997dB").is_err());
        assert!(parse_ds_rate("79997furlongs").is_err());

        let page = TEXT_PAGE.replace("10.1 dB", "10.1 kbps");
        let err = StatsParser::new()
            .parse(&RawStatus::new(page), at(0, 0))
            .unwrap_err();
        assert!(matches!(err, LoggerError::Parse { field: "DS PSD", .. }));

        let page = TEXT_PAGE.replace("12     FE CRC", "12dB     FE CRC");
        let err = StatsParser::new()
            .parse(&RawStatus::new(page), at(0, 0))
            .unwrap_err();
        assert!(matches!(err, LoggerError::Parse { field: "NE CRC Count", .. }));
    }

    #[test]
    fn test_mentions_stat_labels() {
        assert!(mentions_stat_labels(TEXT_PAGE));
        assert!(mentions_stat_labels("<td>NE&nbsp;CRC&nbsp;Count</td>"));
        assert!(!mentions_stat_labels("<form><input type=\"password\"></form>"));
    }
}
