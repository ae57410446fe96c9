//! Contact identity resolution
//!
//! Three bridges each fetch one identity source and fold it into a working
//! entry list. The [`ContactResolver`] runs them in a fixed order (protocol,
//! phone, link merge) and owns the contact CRUD operations.

pub mod link_bridge;
pub mod phone_bridge;
pub mod protocol_bridge;
pub mod resolver;

use crate::model::ContactKey;

pub use link_bridge::LinkMergeBridge;
pub use phone_bridge::PhoneBookBridge;
pub use protocol_bridge::{normalize_alias, ProtocolContactBridge};
pub use resolver::{ContactResolver, RefreshOutcome};

/// A contact operation called against the wrong entry or stale state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("contact {0} not found")]
    NotFound(ContactKey),

    #[error("contact {0} is not a merged contact")]
    NotMerged(ContactKey),

    #[error("contact {0} cannot be linked")]
    NotLinkable(ContactKey),

    #[error("contact {0} is already linked")]
    AlreadyLinked(ContactKey),

    #[error("contact store failed: {0}")]
    Storage(String),

    #[error("wallet engine rejected the change: {0}")]
    Engine(String),

    #[error("phone book rejected the change: {0}")]
    PhoneBook(String),
}
