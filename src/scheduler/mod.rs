//! Scheduling of poll ticks over a bounded run.
//!
//! A run logs in once, then repeatedly fetches, parses and writes a record,
//! sleeping the configured interval between ticks. Time, sleeping and
//! cancellation are injected through the [`Clock`], [`Sleeper`] and
//! [`CancellationSignal`] traits so that a full day's run can be simulated
//! in a test without waiting.

pub mod clock;
pub mod runner;
pub mod shutdown;

// Re-export commonly used items
pub use clock::{Clock, SimulatedClock, Sleeper, SystemClock, TokioSleeper};
pub use runner::{RunOutcome, RunSummary, Scheduler, SchedulerState};
pub use shutdown::{CancellationSignal, ShutdownFlag};
