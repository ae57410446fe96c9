//! Device phone-book seam
//!
//! The phone book is read as a whole snapshot and written back one entry at
//! a time. Both directions are gated on a [`ContactPermission`] flag owned by
//! the host platform.

pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryPhoneBook;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneBookError {
    #[error("contact permission not granted")]
    PermissionDenied,

    #[error("phone book entry {0} not found")]
    NotFound(String),

    #[error("phone book I/O failed: {0}")]
    Io(String),
}

/// One device contact as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneBookEntry {
    pub contact_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_uri: Option<String>,
    #[serde(default)]
    pub starred: bool,
    /// Wallet address kept in a custom field of the device contact.
    #[serde(default)]
    pub wallet_address: Option<String>,
}

impl PhoneBookEntry {
    pub fn new(contact_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            display_name: display_name.into(),
            avatar_uri: None,
            starred: false,
            wallet_address: None,
        }
    }

    pub fn starred(mut self, starred: bool) -> Self {
        self.starred = starred;
        self
    }

    pub fn with_wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }
}

#[async_trait]
pub trait PhoneBookProvider: Send + Sync {
    /// Reads every device contact.
    async fn snapshot(&self) -> Result<Vec<PhoneBookEntry>, PhoneBookError>;

    /// Writes one contact's name and starred flag back to the device.
    async fn write_back(&self, entry: &PhoneBookEntry) -> Result<(), PhoneBookError>;

    async fn delete(&self, contact_id: &str) -> Result<(), PhoneBookError>;
}

/// Shared "contacts permission granted" flag.
#[derive(Debug, Clone, Default)]
pub struct ContactPermission(Arc<AtomicBool>);

impl ContactPermission {
    pub fn new(granted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(granted)))
    }

    pub fn is_granted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the flag. Returns true if it was not already set.
    pub fn grant(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}
