//! Time sources and sleeping, abstracted so runs can be simulated.

use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of local wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Suspends the caller between poll ticks.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// The host's local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Real sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Shared simulated time.
///
/// Acts as both [`Clock`] and [`Sleeper`]: sleeping returns immediately and
/// moves the clock forward by the requested amount. Clones observe the same
/// time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl SimulatedClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let Ok(step) = chrono::Duration::from_std(duration) else {
            return;
        };
        let mut now = self.lock();
        if let Some(next) = now.checked_add_signed(step) {
            *now = next;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}

impl Sleeper for SimulatedClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }
}
