//! Cooperative cancellation of a logging run.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Observed by the scheduler at the top of each tick and while sleeping.
pub trait CancellationSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;

    /// Resolves once cancellation has been requested.
    fn cancelled(&self) -> impl Future<Output = ()> + Send;
}

/// One-way shutdown flag. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Spawn a task that triggers this flag on Ctrl-C.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping");
                    flag.trigger();
                }
                Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
            }
        })
    }
}

impl CancellationSignal for ShutdownFlag {
    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn cancelled(&self) -> impl Future<Output = ()> + Send {
        let mut rx = self.tx.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Every flag handle is gone; nothing can trigger anymore.
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}
