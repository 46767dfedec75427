//! One-shot shutdown fan-out.
//!
//! `main` and the integration harness both own a [`Shutdown`]; the server task
//! holds a receiver and starts draining connections when it fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Shutdown {
    notify: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            notify,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver that yields once the shutdown fires.
    ///
    /// Subscribe before calling [`Shutdown::trigger`]; a late receiver misses it.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Fire the shutdown. Only the first call notifies; returns whether this
    /// call was the one that did.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        let listeners = self.notify.send(()).unwrap_or(0);
        tracing::info!(listeners, "Shutdown triggered");
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Receivers still attached (the server task, while it runs).
    pub fn receiver_count(&self) -> usize {
        self.notify.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
