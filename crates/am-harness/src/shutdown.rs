use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// ShutdownSignal — cooperative shutdown coordination
// ---------------------------------------------------------------------------

/// Level-triggered shutdown flag shared by the HTTP server, the worker pool
/// and the janitor.
///
/// Built on a `watch` channel, so a component that starts listening after
/// the trigger still observes it.
///
/// ```ignore
/// let shutdown = ShutdownSignal::new();
/// tokio::select! {
///     _ = shutdown.triggered() => { /* graceful cleanup */ }
///     _ = do_work() => {}
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Check if shutdown has been triggered (non-blocking).
    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger shutdown for all listeners. Idempotent.
    pub fn trigger(&self) {
        let first = self.tx.send_if_modified(|v| !std::mem::replace(v, true));
        if first {
            info!("shutdown signal triggered");
        } else {
            warn!("shutdown already triggered");
        }
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only fails if it is dropped.
        let _ = rx.wait_for(|v| *v).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
