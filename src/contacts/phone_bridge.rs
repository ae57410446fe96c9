//! Device phone-book contacts

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{ContactIdentity, PhoneContact};
use crate::phonebook::{ContactPermission, PhoneBookEntry, PhoneBookError, PhoneBookProvider};

/// A phone half that was written back, with the values that were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedPhone {
    pub contact_id: String,
    pub alias: Option<String>,
    pub is_favorite: bool,
}

pub struct PhoneBookBridge {
    provider: Arc<dyn PhoneBookProvider>,
    permission: ContactPermission,
}

impl PhoneBookBridge {
    pub fn new(provider: Arc<dyn PhoneBookProvider>, permission: ContactPermission) -> Self {
        Self {
            provider,
            permission,
        }
    }

    pub fn permission(&self) -> &ContactPermission {
        &self.permission
    }

    fn ensure_permission(&self) -> Result<(), PhoneBookError> {
        if self.permission.is_granted() {
            Ok(())
        } else {
            Err(PhoneBookError::PermissionDenied)
        }
    }

    /// Reads the phone book. `None` means this pass has no phone data, either
    /// because permission is missing or the read failed.
    pub async fn fetch(&self) -> Option<Vec<PhoneContact>> {
        if let Err(e) = self.ensure_permission() {
            debug!(error = %e, "Skipping phone book");
            return None;
        }
        match self.provider.snapshot().await {
            Ok(entries) => {
                debug!(count = entries.len(), "Fetched phone book");
                Some(entries.into_iter().map(from_entry).collect())
            }
            Err(e) => {
                warn!(error = %e, "Phone book read failed, skipping its contacts");
                None
            }
        }
    }

    /// Replaces entries by phone id, keeping any merged wrapper, and appends
    /// unknown ids.
    ///
    /// A dirty phone half keeps its local name and favorite flag. A pending
    /// link from the device custom field is only taken for new entries, so an
    /// explicit unlink is not undone by the next read.
    pub fn fold(entries: &mut Vec<ContactIdentity>, incoming: Vec<PhoneContact>) {
        for contact in incoming {
            let existing = entries
                .iter_mut()
                .find_map(|e| e.phone_half_mut().filter(|p| p.contact_id == contact.contact_id));
            match existing {
                Some(half) => {
                    half.avatar_uri = contact.avatar_uri;
                    if !half.dirty {
                        half.alias = contact.alias;
                        half.is_favorite = contact.is_favorite;
                    }
                }
                None => entries.push(ContactIdentity::Phone(contact)),
            }
        }
    }

    /// Writes every dirty phone half back to the device.
    ///
    /// Returns the halves that were written; failures stay dirty.
    pub async fn push_dirty(&self, entries: &[ContactIdentity]) -> Vec<PushedPhone> {
        let dirty: Vec<&PhoneContact> = entries
            .iter()
            .filter_map(ContactIdentity::phone_half)
            .filter(|p| p.dirty)
            .collect();
        if dirty.is_empty() {
            return Vec::new();
        }
        if let Err(e) = self.ensure_permission() {
            debug!(error = %e, pending = dirty.len(), "Holding phone book write-back");
            return Vec::new();
        }

        let mut pushed = Vec::with_capacity(dirty.len());
        for phone in dirty {
            match self.provider.write_back(&to_entry(phone)).await {
                Ok(()) => pushed.push(PushedPhone {
                    contact_id: phone.contact_id.clone(),
                    alias: phone.alias.clone(),
                    is_favorite: phone.is_favorite,
                }),
                Err(e) => {
                    warn!(contact_id = %phone.contact_id, error = %e, "Phone book write-back failed")
                }
            }
        }
        pushed
    }

    /// Clears the dirty flag on halves that still hold the pushed values.
    pub fn clear_pushed(entries: &mut [ContactIdentity], pushed: &[PushedPhone]) {
        for done in pushed {
            let half = entries
                .iter_mut()
                .find_map(|e| e.phone_half_mut().filter(|p| p.contact_id == done.contact_id));
            if let Some(half) = half {
                if half.alias == done.alias && half.is_favorite == done.is_favorite {
                    half.dirty = false;
                }
            }
        }
    }

    /// Removes the device contact. Returns false when it was already gone.
    pub async fn delete(&self, contact_id: &str) -> Result<bool, PhoneBookError> {
        self.ensure_permission()?;
        match self.provider.delete(contact_id).await {
            Ok(()) => Ok(true),
            Err(PhoneBookError::NotFound(_)) => {
                debug!(contact_id, "Phone book entry already gone");
                Ok(false)
            }
            Err(e) => {
                warn!(contact_id, error = %e, "Phone book delete failed");
                Err(e)
            }
        }
    }
}

fn from_entry(entry: PhoneBookEntry) -> PhoneContact {
    let name = entry.display_name.trim();
    PhoneContact {
        alias: (!name.is_empty()).then(|| name.to_string()),
        contact_id: entry.contact_id,
        is_favorite: entry.starred,
        avatar_uri: entry.avatar_uri,
        linked_emoji_address: entry.wallet_address.filter(|a| !a.trim().is_empty()),
        dirty: false,
    }
}

fn to_entry(phone: &PhoneContact) -> PhoneBookEntry {
    PhoneBookEntry {
        contact_id: phone.contact_id.clone(),
        display_name: phone.alias.clone().unwrap_or_default(),
        avatar_uri: phone.avatar_uri.clone(),
        starred: phone.is_favorite,
        wallet_address: phone.linked_emoji_address.clone(),
    }
}
