//! Fixed-window coalescing of "list changed" signals

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};

/// Collapses bursts of change signals into one publication per window.
///
/// The first signal opens a window and later ones are absorbed into it. The
/// pending flag is cleared before publishing, so a signal that arrives after
/// that opens the next window.
#[derive(Clone)]
pub struct Debouncer {
    changed: Arc<Notify>,
    pending: Arc<AtomicBool>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            changed: Arc::new(Notify::new()),
            pending: Arc::new(AtomicBool::new(false)),
            window,
        }
    }

    pub fn signal(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.changed.notify_one();
        }
    }

    /// Runs `publish` once per window until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, mut publish: impl FnMut()) {
        loop {
            tokio::select! {
                _ = self.changed.notified() => {}
                _ = shutdown.changed() => return,
            }
            tokio::select! {
                _ = tokio::time::sleep(self.window) => {
                    self.pending.store(false, Ordering::Release);
                    publish();
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}
