//! Reconciliation coordinator
//!
//! Owns the subscription to the engine's event stream and to external
//! contact signals, drives the ledger and the resolver, and publishes a
//! debounced transaction view.

pub mod coordinator;
pub mod debounce;
pub mod gate;

use serde::{Deserialize, Serialize};

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use debounce::Debouncer;
pub use gate::RefreshGate;

/// Contact-side changes reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactSignal {
    /// The device phone book changed.
    PhoneBookChanged,
    /// The platform granted the contacts permission.
    PermissionGranted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator has shut down")]
    Stopped,
}
