//! # bblogger - Broadband Modem Statistics Logger
//!
//! Periodically logs in to a DSL modem's web management interface, reads
//! its line statistics and appends them to a log file, for a bounded period
//! on a fixed polling interval.
//!
//! ## Features
//!
//! - **Layered configuration**: command line over named modem profiles over built-in defaults
//! - **Session handling**: cookie login with one automatic re-login on expiry
//! - **Tolerant parsing**: statistics found by label in text or HTML status pages
//! - **Two renderings**: human-readable `Label: value` dumps or CSV rows
//! - **Append-only output**: optional one file per calendar day
//! - **Simulated time**: clock, sleep and cancellation are injectable
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bblogger::{
//!     resolve, Defaults, ModemSession, OutputWriter, Overrides, Scheduler, ShutdownFlag,
//!     SystemClock, TerminalPrompter, TokioSleeper,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let overrides = Overrides {
//!         modem: Some("192.168.1.1".into()),
//!         ..Default::default()
//!     };
//!     let config = resolve(&Defaults::default(), None, &overrides, &TerminalPrompter)?;
//!
//!     let mut modem = ModemSession::with_http(&config)?;
//!     let mut writer = OutputWriter::new(&config);
//!     let shutdown = ShutdownFlag::new();
//!     shutdown.listen_for_ctrl_c();
//!
//!     let mut scheduler = Scheduler::new(SystemClock, TokioSleeper, shutdown);
//!     let summary = scheduler.run(&config, &mut modem, &mut writer).await?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod modem;
pub mod output;
pub mod scheduler;
pub mod stats;

// Re-export public API
pub use config::{
    resolve, Defaults, EffectiveConfig, OutputFormat, Overrides, Profile, SecretPrompter,
    Settings, TerminalPrompter,
};
pub use error::{LoggerError, Result};
pub use modem::{HttpTransport, ModemAddress, ModemSession, Transport};
pub use output::OutputWriter;
pub use scheduler::{
    CancellationSignal, Clock, RunOutcome, RunSummary, Scheduler, ShutdownFlag, SimulatedClock,
    Sleeper, SystemClock, TokioSleeper,
};
pub use stats::{RawStatus, StatsParser, StatsRecord, Uptime};

/// Modem address used when none is given
pub const DEFAULT_MODEM_ADDRESS: &str = "192.168.1.1";

/// Account used when none is given
pub const DEFAULT_ACCOUNT: &str = "admin";

/// The default time between polls, in minutes
pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;

/// The default length of a run, in hours
pub const DEFAULT_DURATION_HOURS: u64 = 24;
