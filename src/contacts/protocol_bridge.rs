//! Protocol contacts: the engine's contact list plus transaction counterparties

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::{EngineContact, EngineError, WalletEngine};
use crate::model::{ContactIdentity, ProtocolContact, Tx};

pub struct ProtocolContactBridge {
    engine: Arc<dyn WalletEngine>,
}

impl ProtocolContactBridge {
    pub fn new(engine: Arc<dyn WalletEngine>) -> Self {
        Self { engine }
    }

    /// Transaction-derived contacts first, then the engine's own list,
    /// distinct by address keeping the first.
    ///
    /// Each engine call fails on its own; a failed call contributes nothing.
    pub fn fetch(&self) -> Vec<ProtocolContact> {
        let engine_contacts = logged("contacts", self.engine.contacts()).unwrap_or_default();
        let by_address: HashMap<&str, &EngineContact> = engine_contacts
            .iter()
            .map(|c| (c.address.as_str(), c))
            .collect();

        let mut txs: Vec<Tx> = Vec::new();
        for (call, result) in [
            ("completed_txs", self.engine.completed_txs()),
            ("cancelled_txs", self.engine.cancelled_txs()),
            ("pending_inbound_txs", self.engine.pending_inbound_txs()),
            ("pending_outbound_txs", self.engine.pending_outbound_txs()),
        ] {
            if let Some(list) = logged(call, result) {
                txs.extend(list);
            }
        }
        txs.retain(Tx::has_known_counterparty);
        txs.sort_by(|a, b| b.timestamp_seconds.cmp(&a.timestamp_seconds));

        let from_txs = txs.iter().map(|tx| {
            let mut contact = match by_address.get(tx.counterparty_address.as_str()) {
                Some(known) => from_engine(known),
                None => ProtocolContact::new(tx.counterparty_address.clone()),
            };
            contact.last_used_timestamp = Some(tx.timestamp_seconds);
            contact
        });
        let from_engine_list = engine_contacts.iter().map(from_engine);

        let mut seen = HashSet::new();
        let contacts: Vec<ProtocolContact> = from_txs
            .chain(from_engine_list)
            .filter(|c| seen.insert(c.wallet_address.clone()))
            .collect();
        debug!(count = contacts.len(), "Fetched protocol contacts");
        contacts
    }

    /// Replaces entries by wallet address, keeping any merged wrapper, and
    /// appends unknown addresses.
    pub fn fold(entries: &mut Vec<ContactIdentity>, incoming: Vec<ProtocolContact>) {
        for contact in incoming {
            let existing = entries
                .iter_mut()
                .find(|e| e.wallet_address() == Some(contact.wallet_address.as_str()));
            match existing {
                Some(ContactIdentity::Merged(m)) => m.protocol = contact,
                Some(entry) => *entry = ContactIdentity::Protocol(contact),
                None => entries.push(ContactIdentity::Protocol(contact)),
            }
        }
    }

    /// Writes alias and favorite flag to the engine.
    pub fn push(&self, contact: &ProtocolContact) -> Result<(), EngineError> {
        let alias = normalize_alias(contact.alias.as_deref(), &contact.wallet_address);
        self.engine
            .update_contact(&contact.wallet_address, &alias, contact.is_favorite)
            .inspect_err(|e| warn!(address = %contact.wallet_address, error = %e, "Failed to push contact"))
    }

    /// Removes the engine's contact. Returns false when the engine never held
    /// it, as for contacts known only from transactions.
    pub fn delete(&self, address: &str) -> Result<bool, EngineError> {
        match self.engine.remove_contact(address) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(address, "Engine holds no contact for address");
                Ok(false)
            }
            Err(e) => {
                warn!(address, error = %e, "Failed to remove engine contact");
                Err(e)
            }
        }
    }
}

/// The alias as the engine stores it: trimmed, and empty when it would only
/// repeat the address.
pub fn normalize_alias(alias: Option<&str>, address: &str) -> String {
    match alias.map(str::trim) {
        Some(a) if !a.is_empty() && a != address => a.to_string(),
        _ => String::new(),
    }
}

fn from_engine(contact: &EngineContact) -> ProtocolContact {
    let alias = contact.alias.trim();
    ProtocolContact {
        wallet_address: contact.address.clone(),
        alias: (!alias.is_empty()).then(|| alias.to_string()),
        is_favorite: contact.is_favorite,
        last_used_timestamp: None,
    }
}

fn logged<T>(call: &'static str, result: Result<T, EngineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(call, code = e.code, "Engine call failed, skipping its contacts");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MergedContact, PhoneContact};

    #[test]
    fn test_normalize_alias() {
        assert_eq!(normalize_alias(Some("  Bob "), "A"), "Bob");
        assert_eq!(normalize_alias(Some("A"), "A"), "");
        assert_eq!(normalize_alias(Some("   "), "A"), "");
        assert_eq!(normalize_alias(None, "A"), "");
    }

    #[test]
    fn test_fold_keeps_merged_wrapper() {
        let mut entries = vec![ContactIdentity::Merged(MergedContact::new(
            ProtocolContact::new("A"),
            PhoneContact::new("1").with_alias("Alice"),
        ))];
        ProtocolContactBridge::fold(
            &mut entries,
            vec![
                ProtocolContact::new("A").with_alias("alice-wallet"),
                ProtocolContact::new("B"),
            ],
        );
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            ContactIdentity::Merged(m) => {
                assert_eq!(m.protocol.alias.as_deref(), Some("alice-wallet"));
                assert_eq!(m.phone.alias.as_deref(), Some("Alice"));
            }
            other => panic!("expected merged entry, got {other:?}"),
        }
        assert_eq!(entries[1].wallet_address(), Some("B"));
    }
}
