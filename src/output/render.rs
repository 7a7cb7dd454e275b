//! Text renderings of a [`StatsRecord`].

use crate::stats::data::{StatsRecord, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::fmt::Write;

/// Banner opening a dump-format run.
pub fn dump_banner(end_time: NaiveDateTime) -> String {
    format!(
        "Logging modem statistics until {}\n\n",
        end_time.format(TIMESTAMP_FORMAT)
    )
}

/// One `Label: value` line per field, followed by a blank line.
pub fn dump_block(record: &StatsRecord) -> String {
    let mut out = String::new();
    for (label, value) in record.fields() {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}: {}", label, value);
    }
    out.push('\n');
    out
}

/// Turn a modem identifier into something safe to put in a file name.
pub fn sanitize_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut last_us = false;
    for ch in id.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
            out.push(ch);
            last_us = false;
        } else if !last_us {
            out.push('_');
            last_us = true;
        }
    }
    let out = out.trim_matches(|c| c == '_' || c == '.').to_string();
    if out.is_empty() {
        "modem".to_string()
    } else {
        out
    }
}
