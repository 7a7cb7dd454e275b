//! The poll loop: login, then fetch, parse, write and sleep until the run
//! ends or is cancelled.

use crate::config::EffectiveConfig;
use crate::error::Result;
use crate::modem::ModemSession;
use crate::output::OutputWriter;
use crate::scheduler::clock::{Clock, Sleeper};
use crate::scheduler::shutdown::CancellationSignal;
use crate::stats::data::TIMESTAMP_FORMAT;
use crate::stats::StatsParser;
use chrono::NaiveDateTime;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where the scheduler currently is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Authenticating,
    Polling,
    Fetching,
    Parsing,
    Writing,
    Sleeping,
    Completed,
    Cancelled,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Authenticating => "authenticating",
            SchedulerState::Polling => "polling",
            SchedulerState::Fetching => "fetching",
            SchedulerState::Parsing => "parsing",
            SchedulerState::Writing => "writing",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Completed => "completed",
            SchedulerState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The configured duration elapsed
    Completed,
    /// Cancellation was requested before the end
    Cancelled,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub records_written: u64,
    pub ticks_skipped: u64,
}

/// Drives one logging run over injectable time and cancellation sources.
pub struct Scheduler<C, S, K> {
    clock: C,
    sleeper: S,
    cancel: K,
    parser: StatsParser,
    state: SchedulerState,
}

impl<C: Clock, S: Sleeper, K: CancellationSignal> Scheduler<C, S, K> {
    pub fn new(clock: C, sleeper: S, cancel: K) -> Self {
        Self {
            clock,
            sleeper,
            cancel,
            parser: StatsParser::new(),
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run until the configured duration has elapsed or cancellation is
    /// requested.
    ///
    /// Ticks are due at `start + n * interval`, so time spent talking to the
    /// modem does not push later polls back. Slots already missed when a
    /// tick finishes are skipped.
    ///
    /// Transport and parse failures skip the tick. Authentication and
    /// output failures end the run with an error; the writer is closed and
    /// the session logged out on every exit path.
    pub async fn run(
        &mut self,
        config: &EffectiveConfig,
        modem: &mut ModemSession,
        writer: &mut OutputWriter,
    ) -> Result<RunSummary> {
        self.state = SchedulerState::Authenticating;
        info!("Logging in to {} as {}", modem.address(), config.account);
        if let Err(e) = modem.login().await {
            self.state = SchedulerState::Idle;
            return Err(e);
        }

        let start = self.clock.now();
        let end = start
            .checked_add_signed(config.duration())
            .unwrap_or(NaiveDateTime::MAX);
        writer.begin(end);
        info!("Logging modem statistics until {}", end.format(TIMESTAMP_FORMAT));

        let period = config.interval();
        let mut next_tick = start;
        let mut records_written = 0;
        let mut ticks_skipped = 0;
        self.state = SchedulerState::Polling;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            if self.clock.now() >= end {
                break RunOutcome::Completed;
            }

            match self.tick(modem, writer).await {
                Ok(()) => records_written += 1,
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping poll: {}", e);
                    ticks_skipped += 1;
                }
                Err(e) => {
                    error!("Stopping run: {}", e);
                    if let Err(close_err) = Self::release(modem, writer).await {
                        warn!("Failed to close output: {}", close_err);
                    }
                    self.state = SchedulerState::Idle;
                    return Err(e);
                }
            }

            let now = self.clock.now();
            let due = next_deadline(next_tick, period, now);
            if due.checked_sub_signed(period) != Some(next_tick) {
                warn!("Poll overran its interval, next poll at {}", due.format(TIMESTAMP_FORMAT));
            }
            next_tick = due;
            let wait = (next_tick - now).to_std().unwrap_or(Duration::ZERO);

            self.state = SchedulerState::Sleeping;
            debug!("Sleeping {}s until {}", wait.as_secs(), next_tick.format(TIMESTAMP_FORMAT));
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = self.sleeper.sleep(wait) => {}
            }
            self.state = SchedulerState::Polling;
        };

        let released = Self::release(modem, writer).await;
        self.state = match outcome {
            RunOutcome::Completed => SchedulerState::Completed,
            RunOutcome::Cancelled => SchedulerState::Cancelled,
        };
        released?;

        info!(
            "Run {}: {} records written, {} polls skipped",
            self.state, records_written, ticks_skipped
        );
        Ok(RunSummary {
            outcome,
            records_written,
            ticks_skipped,
        })
    }

    /// Fetch, parse and write one record. Nothing is written unless every
    /// step before it succeeded.
    async fn tick(&mut self, modem: &mut ModemSession, writer: &mut OutputWriter) -> Result<()> {
        let polled_at = self.clock.now();

        self.state = SchedulerState::Fetching;
        let raw = modem.poll().await?;

        self.state = SchedulerState::Parsing;
        let record = self.parser.parse(&raw, polled_at)?;

        self.state = SchedulerState::Writing;
        writer.write(&record)?;
        debug!("Recorded poll at {}", record.timestamp.format(TIMESTAMP_FORMAT));
        Ok(())
    }

    async fn release(modem: &mut ModemSession, writer: &mut OutputWriter) -> Result<()> {
        let closed = writer.close();
        modem.logout().await;
        closed
    }
}

/// First slot on the `previous + k * period` grid strictly after `now`.
fn next_deadline(
    previous: NaiveDateTime,
    period: chrono::Duration,
    now: NaiveDateTime,
) -> NaiveDateTime {
    let mut next = previous;
    loop {
        next = next.checked_add_signed(period).unwrap_or(NaiveDateTime::MAX);
        if next > now || next == NaiveDateTime::MAX {
            return next;
        }
    }
}
