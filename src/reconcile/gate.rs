//! Non-blocking single-flight guard for contact resolution

use std::sync::atomic::{AtomicBool, Ordering};

/// At most one resolution pass runs at a time.
///
/// A request made while a pass is running sets `rerun`; the running worker
/// does one more pass covering every such request, then releases the gate.
#[derive(Debug, Default)]
pub struct RefreshGate {
    in_flight: AtomicBool,
    rerun: AtomicBool,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request. Returns true if the caller must start the worker.
    pub fn request(&self) -> bool {
        self.rerun.store(true, Ordering::SeqCst);
        self.try_acquire()
    }

    fn try_acquire(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Called by the worker before each pass. Returns false when no request is
    /// outstanding, which ends the worker.
    pub fn begin_pass(&self) -> bool {
        self.rerun.swap(false, Ordering::SeqCst)
    }

    /// Called by the worker when `begin_pass` returns false. Returns true if a
    /// request slipped in and the worker should keep going.
    pub fn release(&self) -> bool {
        self.in_flight.store(false, Ordering::SeqCst);
        self.rerun.load(Ordering::SeqCst) && self.try_acquire()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}
