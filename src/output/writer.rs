//! Durable, append-only persistence of statistics records.

use crate::config::{EffectiveConfig, OutputFormat};
use crate::error::Result;
use crate::output::render::{dump_banner, dump_block, sanitize_file_stem};
use crate::stats::data::{StatsRecord, FIELD_LABELS};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File stem used when output is not split by day.
pub const SINGLE_FILE_STEM: &str = "modem-stats";

enum Sink {
    Dump(BufWriter<File>),
    Csv(csv::Writer<File>),
}

/// An open output file and the calendar day it was opened for.
struct OutputTarget {
    path: PathBuf,
    day: NaiveDate,
    sink: Sink,
}

impl OutputTarget {
    /// Open `path` for appending, creating it if needed. A CSV header is
    /// only written when the file is empty.
    fn open(path: PathBuf, day: NaiveDate, format: OutputFormat) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;

        let sink = match format {
            OutputFormat::Dump => Sink::Dump(BufWriter::new(file)),
            OutputFormat::Csv => {
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(file);
                if is_empty {
                    writer.write_record(FIELD_LABELS)?;
                    writer.flush()?;
                }
                Sink::Csv(writer)
            }
        };

        debug!("Opened {} (new: {})", path.display(), is_empty);
        Ok(Self { path, day, sink })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write_banner(&mut self, end_time: NaiveDateTime) -> Result<()> {
        if let Sink::Dump(out) = &mut self.sink {
            out.write_all(dump_banner(end_time).as_bytes())?;
            out.flush()?;
        }
        Ok(())
    }

    fn append(&mut self, record: &StatsRecord) -> Result<()> {
        match &mut self.sink {
            Sink::Dump(out) => {
                out.write_all(dump_block(record).as_bytes())?;
                out.flush()?;
            }
            Sink::Csv(out) => {
                out.write_record(record.values())?;
                out.flush()?;
            }
        }
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        match &mut self.sink {
            Sink::Dump(out) => out.flush()?,
            Sink::Csv(out) => out.flush()?,
        }
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}

/// An explicit `output_file` wins; otherwise daily files are named after the
/// modem and a single file gets [`SINGLE_FILE_STEM`].
fn file_stem(config: &EffectiveConfig) -> String {
    match (&config.output_file, config.daily_split) {
        (Some(stem), _) => sanitize_file_stem(stem),
        (None, true) => sanitize_file_stem(&config.modem_id),
        (None, false) => SINGLE_FILE_STEM.to_string(),
    }
}

/// Renders records and appends them to the current output file.
///
/// The target is opened lazily on the first write. With daily split enabled
/// the target is rotated whenever a record belongs to a different calendar
/// day than the open file.
pub struct OutputWriter {
    dir: PathBuf,
    format: OutputFormat,
    daily_split: bool,
    stem: String,
    end_time: Option<NaiveDateTime>,
    banner_written: bool,
    target: Option<OutputTarget>,
}

impl OutputWriter {
    pub fn new(config: &EffectiveConfig) -> Self {
        Self {
            dir: config.output_dir.clone(),
            format: config.format,
            daily_split: config.daily_split,
            stem: file_stem(config),
            end_time: None,
            banner_written: false,
            target: None,
        }
    }

    /// Start a run ending at `end_time`. Dump output announces it once,
    /// ahead of the first record of the run.
    pub fn begin(&mut self, end_time: NaiveDateTime) {
        self.end_time = Some(end_time);
        self.banner_written = false;
    }

    /// File a record stamped on `day` is written to.
    pub fn target_path(&self, day: NaiveDate) -> PathBuf {
        let ext = self.format.extension();
        let name = if self.daily_split {
            format!("{}-{}.{}", self.stem, day.format("%Y-%m-%d"), ext)
        } else {
            format!("{}.{}", self.stem, ext)
        };
        self.dir.join(name)
    }

    /// Append one record, rotating the target first if the day changed.
    pub fn write(&mut self, record: &StatsRecord) -> Result<()> {
        let day = record.timestamp.date();

        let target = match self.target.take() {
            Some(open) if !self.daily_split || open.day == day => open,
            Some(stale) => {
                info!("Day changed, rotating output away from {}", stale.path.display());
                stale.close()?;
                OutputTarget::open(self.target_path(day), day, self.format)?
            }
            None => OutputTarget::open(self.target_path(day), day, self.format)?,
        };
        let target = self.target.insert(target);

        if !self.banner_written {
            if let Some(end_time) = self.end_time {
                target.write_banner(end_time)?;
            }
            self.banner_written = true;
        }

        target.append(record)
    }

    /// Flush and release the open target, if any.
    pub fn close(&mut self) -> Result<()> {
        match self.target.take() {
            Some(target) => target.close(),
            None => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.target.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.target.as_ref().map(OutputTarget::path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggerError;
    use crate::stats::data::Uptime;
    use tempfile::tempdir;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn record(timestamp: NaiveDateTime) -> StatsRecord {
        StatsRecord {
            timestamp,
            uptime: Uptime::new(3, 4),
            reset_count: 0,
            link_count: 1,
            ds_actual_rate: 68_684_000,
            ds_attainable_rate: 84_385_284,
            ds_psd: 10.1,
            ne_attenuation: 15.0,
            ne_snr_margin: 6.0,
            ne_rx_cells: 100,
            ne_tx_cells: 200,
            ne_crc_count: 2,
            ne_es_count: 1,
            us_actual_rate: 19_999_000,
            us_attainable_rate: 27_658_000,
            us_psd: -2.5,
            fe_attenuation: 0.0,
            fe_snr_margin: 5.0,
            fe_crc_count: 0,
            fe_es_count: 0,
        }
    }

    fn config(dir: &Path, format: OutputFormat, daily_split: bool) -> EffectiveConfig {
        EffectiveConfig {
            modem_id: "home".into(),
            address: "192.168.1.1".into(),
            account: "admin".into(),
            password: "secret".into(),
            interval_minutes: 15,
            duration_hours: 24,
            format,
            daily_split,
            output_dir: dir.to_path_buf(),
            output_file: None,
            login_path: "/login".into(),
            logout_path: "/logout".into(),
            status_paths: vec!["/status".into()],
        }
    }

    fn started(config: &EffectiveConfig, end_time: NaiveDateTime) -> OutputWriter {
        let mut writer = OutputWriter::new(config);
        writer.begin(end_time);
        writer
    }

    #[test]
    fn test_file_naming() {
        let dir = tempdir().unwrap();
        let single = started(&config(dir.path(), OutputFormat::Csv, false), at(2, 0, 0));
        assert_eq!(
            single.target_path(at(1, 0, 0).date()),
            dir.path().join("modem-stats.csv")
        );

        let daily = started(&config(dir.path(), OutputFormat::Dump, true), at(2, 0, 0));
        assert_eq!(
            daily.target_path(at(1, 0, 0).date()),
            dir.path().join("home-2024-06-01.log")
        );
    }

    #[test]
    fn test_output_file_names_the_target() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path(), OutputFormat::Csv, false);
        cfg.output_file = Some("line check".into());

        let mut single = started(&cfg, at(2, 0, 0));
        assert_eq!(
            single.target_path(at(1, 0, 0).date()),
            dir.path().join("line_check.csv")
        );
        single.write(&record(at(1, 9, 0))).unwrap();
        single.close().unwrap();
        assert!(dir.path().join("line_check.csv").is_file());
        assert!(!dir.path().join("modem-stats.csv").exists());

        cfg.daily_split = true;
        cfg.format = OutputFormat::Dump;
        let daily = started(&cfg, at(2, 0, 0));
        assert_eq!(
            daily.target_path(at(1, 0, 0).date()),
            dir.path().join("line_check-2024-06-01.log")
        );
    }

    #[test]
    fn test_csv_header_once_across_runs() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), OutputFormat::Csv, false);

        let mut first = started(&cfg, at(2, 0, 0));
        first.write(&record(at(1, 10, 0))).unwrap();
        first.write(&record(at(1, 10, 15))).unwrap();
        first.close().unwrap();

        let mut second = started(&cfg, at(2, 0, 0));
        second.write(&record(at(1, 11, 0))).unwrap();
        second.close().unwrap();

        let text = fs::read_to_string(dir.path().join("modem-stats.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Timestamp,Uptime,Reset Times,"));
        assert!(lines[1].starts_with("2024-06-01 10:00,3:04,0,1,68684000,"));
        assert!(lines[2].starts_with("2024-06-01 10:15,"));
        assert!(lines[3].starts_with("2024-06-01 11:00,"));
        assert_eq!(lines[1].split(',').count(), FIELD_LABELS.len());
    }

    #[test]
    fn test_dump_banner_and_blocks() {
        let dir = tempdir().unwrap();
        let mut writer = started(&config(dir.path(), OutputFormat::Dump, false), at(2, 10, 0));
        writer.write(&record(at(1, 10, 0))).unwrap();
        writer.write(&record(at(1, 10, 15))).unwrap();
        writer.close().unwrap();

        let text = fs::read_to_string(dir.path().join("modem-stats.log")).unwrap();
        assert!(text.starts_with("Logging modem statistics until 2024-06-02 10:00\n\n"));
        assert_eq!(text.matches("Logging modem statistics").count(), 1);
        assert_eq!(text.matches("Timestamp: ").count(), 2);
        assert!(text.contains("Timestamp: 2024-06-01 10:00\nUptime: 3:04\nReset Times: 0\n"));
        assert!(text.contains("FE ES Count: 0\n\nTimestamp: 2024-06-01 10:15\n"));
        assert!(text.ends_with("FE ES Count: 0\n\n"));
    }

    #[test]
    fn test_dump_appends_across_runs() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), OutputFormat::Dump, false);

        let mut first = started(&cfg, at(1, 12, 0));
        first.write(&record(at(1, 10, 0))).unwrap();
        first.close().unwrap();

        let mut second = started(&cfg, at(2, 12, 0));
        second.write(&record(at(1, 13, 0))).unwrap();
        second.close().unwrap();

        let text = fs::read_to_string(dir.path().join("modem-stats.log")).unwrap();
        assert_eq!(text.matches("Logging modem statistics until").count(), 2);
        assert!(text.contains("Timestamp: 2024-06-01 10:00\n"));
        assert!(text.contains("\n\nLogging modem statistics until 2024-06-02 12:00\n\nTimestamp: 2024-06-01 13:00\n"));
    }

    #[test]
    fn test_daily_split_rotates_at_midnight() {
        let dir = tempdir().unwrap();
        let mut writer =
            started(&config(dir.path(), OutputFormat::Csv, true), at(3, 0, 0));

        writer.write(&record(at(1, 23, 30))).unwrap();
        writer.write(&record(at(1, 23, 45))).unwrap();
        assert_eq!(writer.current_path(), Some(dir.path().join("home-2024-06-01.csv").as_path()));
        writer.write(&record(at(2, 0, 0))).unwrap();
        assert_eq!(writer.current_path(), Some(dir.path().join("home-2024-06-02.csv").as_path()));
        writer.close().unwrap();

        let day1 = fs::read_to_string(dir.path().join("home-2024-06-01.csv")).unwrap();
        let day2 = fs::read_to_string(dir.path().join("home-2024-06-02.csv")).unwrap();
        assert_eq!(day1.lines().count(), 3);
        assert_eq!(day2.lines().count(), 2);
        assert!(day1.lines().skip(1).all(|l| l.starts_with("2024-06-01")));
        assert!(day2.lines().skip(1).all(|l| l.starts_with("2024-06-02")));
    }

    #[test]
    fn test_no_split_keeps_single_file_over_midnight() {
        let dir = tempdir().unwrap();
        let mut writer =
            started(&config(dir.path(), OutputFormat::Csv, false), at(3, 0, 0));
        writer.write(&record(at(1, 23, 45))).unwrap();
        writer.write(&record(at(2, 0, 0))).unwrap();
        writer.close().unwrap();

        let text = fs::read_to_string(dir.path().join("modem-stats.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_close_releases_target() {
        let dir = tempdir().unwrap();
        let mut writer =
            started(&config(dir.path(), OutputFormat::Dump, false), at(2, 0, 0));
        assert!(!writer.is_open());
        writer.write(&record(at(1, 9, 0))).unwrap();
        assert!(writer.is_open());
        writer.close().unwrap();
        assert!(!writer.is_open());
        assert!(writer.current_path().is_none());
        writer.close().unwrap();
    }

    #[test]
    fn test_unwritable_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let mut writer =
            started(&config(&blocker, OutputFormat::Csv, false), at(2, 0, 0));
        let err = writer.write(&record(at(1, 9, 0))).unwrap_err();
        assert!(matches!(err, LoggerError::Io(_)));
        assert!(!writer.is_open());
    }
}
