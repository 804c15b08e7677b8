//! Node-wide stop signal.
//!
//! Every background loop `select!`s on a broadcast receiver taken from the
//! controller. One `shutdown` call wakes all of them.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(1).0,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Wake every subscriber. Returns `false` if shutdown was already
    /// triggered, in which case nothing is sent.
    pub fn shutdown(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Block until the process is asked to terminate, then trigger shutdown.
    pub async fn shutdown_on_signal(&self) {
        let signal = termination_signal().await;
        info!(signal, "termination requested");
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves with the name of the first termination signal received.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                return tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                };
            }
            Err(e) => warn!(error = %e, "SIGTERM unavailable, waiting for SIGINT only"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "SIGINT unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
