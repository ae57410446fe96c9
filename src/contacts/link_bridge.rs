//! User-created links between phone contacts and wallet addresses

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{ContactIdentity, MergedContact};
use crate::storage::{ContactStore, LinkRecord};

pub struct LinkMergeBridge {
    store: Arc<ContactStore>,
}

impl LinkMergeBridge {
    pub fn new(store: Arc<ContactStore>) -> Self {
        Self { store }
    }

    pub fn fetch(&self) -> Vec<LinkRecord> {
        match self.store.links() {
            Ok(links) => links,
            Err(e) => {
                warn!(error = %e, "Reading contact links failed, skipping them");
                Vec::new()
            }
        }
    }

    /// Marks linked phone contacts as pending, then merges every pending
    /// phone contact whose address has a protocol entry.
    ///
    /// A stored link overrides an address from the device custom field. A
    /// pending link with no protocol entry yet stays pending.
    pub fn fold(entries: &mut Vec<ContactIdentity>, links: &[LinkRecord]) {
        for link in links {
            let phone = entries.iter_mut().find_map(|e| match e {
                ContactIdentity::Phone(p) if p.contact_id == link.phone_contact_id => Some(p),
                _ => None,
            });
            if let Some(phone) = phone {
                phone.linked_emoji_address = Some(link.wallet_address.clone());
            }
        }

        let mut i = 0;
        while i < entries.len() {
            let target = match &entries[i] {
                ContactIdentity::Phone(p) => p.pending_link().and_then(|address| {
                    let found = entries.iter().position(|e| {
                        matches!(e, ContactIdentity::Protocol(c) if c.wallet_address == address)
                    });
                    if found.is_none() {
                        debug!(address, "Link pending until protocol contact appears");
                    }
                    found
                }),
                _ => None,
            };
            // A merge removes slot `i`, so the next entry moves into it.
            match target {
                Some(target) if merge_pair(entries, i, target) => {}
                _ => i += 1,
            }
        }
    }

    pub fn push_link(&self, link: &LinkRecord) -> anyhow::Result<()> {
        self.store.put_link(link)
    }

    pub fn remove_link(&self, phone_contact_id: &str) -> anyhow::Result<bool> {
        self.store.remove_link(phone_contact_id)
    }

    /// Drops every link touching either side of an entry.
    pub fn forget(&self, entry: &ContactIdentity) {
        if let Some(id) = entry.phone_contact_id() {
            if let Err(e) = self.store.remove_link(id) {
                warn!(contact_id = id, error = %e, "Failed to drop contact link");
            }
        }
        if let Some(address) = entry.wallet_address() {
            if let Err(e) = self.store.remove_links_for_address(address) {
                warn!(address, error = %e, "Failed to drop contact link");
            }
        }
    }
}

/// Replaces the protocol entry with the merged pair and drops the phone entry.
fn merge_pair(entries: &mut Vec<ContactIdentity>, phone_at: usize, protocol_at: usize) -> bool {
    let merged = match (&entries[phone_at], &entries[protocol_at]) {
        (ContactIdentity::Phone(phone), ContactIdentity::Protocol(protocol)) => {
            MergedContact::new(protocol.clone(), phone.clone())
        }
        _ => return false,
    };
    entries[protocol_at] = ContactIdentity::Merged(merged);
    entries.remove(phone_at);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PhoneContact, ProtocolContact};

    fn link(phone: &str, address: &str) -> LinkRecord {
        LinkRecord {
            phone_contact_id: phone.into(),
            wallet_address: address.into(),
        }
    }

    #[test]
    fn test_fold_merges_linked_pair() {
        let mut entries = vec![
            ContactIdentity::Phone(PhoneContact::new("1").favorite(true)),
            ContactIdentity::Protocol(ProtocolContact::new("A")),
            ContactIdentity::Protocol(ProtocolContact::new("B")),
        ];
        LinkMergeBridge::fold(&mut entries, &[link("1", "A")]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind(), "merged");
        assert!(entries[0].is_favorite());
        assert_eq!(entries[1].wallet_address(), Some("B"));
    }

    #[test]
    fn test_fold_leaves_link_pending_without_protocol() {
        let mut entries = vec![ContactIdentity::Phone(PhoneContact::new("1"))];
        LinkMergeBridge::fold(&mut entries, &[link("1", "Z")]);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].phone_half().and_then(|p| p.pending_link()),
            Some("Z")
        );
    }

    #[test]
    fn test_stored_link_overrides_custom_field() {
        let mut phone = PhoneContact::new("1");
        phone.linked_emoji_address = Some("A".into());
        let mut entries = vec![
            ContactIdentity::Protocol(ProtocolContact::new("A")),
            ContactIdentity::Protocol(ProtocolContact::new("B")),
            ContactIdentity::Phone(phone),
        ];
        LinkMergeBridge::fold(&mut entries, &[link("1", "B")]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind(), "protocol");
        assert_eq!(entries[1].kind(), "merged");
        assert_eq!(entries[1].wallet_address(), Some("B"));
    }
}
