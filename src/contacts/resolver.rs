//! Contact identity resolver
//!
//! A resolution pass fetches all three sources without holding any lock,
//! then folds them into the current directory under the write lock. CRUD
//! operations take the same lock, so a pass never commits over an edit made
//! while its fetches were running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::{LinkMergeBridge, PhoneBookBridge, ProtocolContactBridge, ResolveError};
use crate::engine::{EngineError, WalletEngine};
use crate::model::{
    ContactDirectory, ContactIdentity, ContactKey, MergedContact, ProtocolContact, Tx,
};
use crate::phonebook::{ContactPermission, PhoneBookError, PhoneBookProvider};
use crate::storage::{ContactStore, LinkRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The pass folded its sources and published a changed directory.
    Committed,
    /// The folds reproduced the current directory; nothing was published.
    Unchanged,
    /// Teardown happened while the pass ran; nothing was published.
    Discarded,
}

pub struct ContactResolver {
    protocol: ProtocolContactBridge,
    phone: PhoneBookBridge,
    links: LinkMergeBridge,
    store: Arc<ContactStore>,
    persist: bool,
    directory: watch::Sender<Arc<ContactDirectory>>,
    write_lock: Mutex<()>,
}

impl ContactResolver {
    /// Builds the resolver, restoring the last saved directory when
    /// `persist` is set.
    pub fn new(
        engine: Arc<dyn WalletEngine>,
        provider: Arc<dyn PhoneBookProvider>,
        permission: ContactPermission,
        store: Arc<ContactStore>,
        persist: bool,
    ) -> Self {
        let restored = if persist {
            match store.load_directory() {
                Ok(Some(dir)) => {
                    info!(entries = dir.len(), "Restored contact directory");
                    dir
                }
                Ok(None) => ContactDirectory::default(),
                Err(e) => {
                    warn!(error = %e, "Failed to restore contact directory");
                    ContactDirectory::default()
                }
            }
        } else {
            ContactDirectory::default()
        };
        let (directory, _) = watch::channel(Arc::new(restored));

        Self {
            protocol: ProtocolContactBridge::new(engine),
            phone: PhoneBookBridge::new(provider, permission),
            links: LinkMergeBridge::new(Arc::clone(&store)),
            store,
            persist,
            directory,
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<ContactDirectory> {
        self.directory.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ContactDirectory>> {
        self.directory.subscribe()
    }

    pub fn permission(&self) -> &ContactPermission {
        self.phone.permission()
    }

    fn commit(&self, directory: ContactDirectory) {
        if self.persist {
            if let Err(e) = self.store.save_directory(&directory) {
                warn!(error = %e, "Failed to save contact directory");
            }
        }
        self.directory.send_replace(Arc::new(directory));
    }

    /// Runs one resolution pass: protocol fold, phone fold, link merge.
    ///
    /// A failed source contributes nothing to this pass. If `torn_down` is
    /// set by the time the folds are ready, the result is dropped.
    pub async fn refresh(&self, torn_down: &AtomicBool) -> RefreshOutcome {
        let base = self.snapshot();
        let pushed = self.phone.push_dirty(&base.entries).await;
        let protocol = self.protocol.fetch();
        let phone = self.phone.fetch().await;
        let links = self.links.fetch();

        let _guard = self.write_lock.lock().await;
        if torn_down.load(Ordering::Acquire) {
            debug!("Discarding contact pass after teardown");
            return RefreshOutcome::Discarded;
        }

        let mut entries = self.snapshot().entries.clone();
        PhoneBookBridge::clear_pushed(&mut entries, &pushed);
        ProtocolContactBridge::fold(&mut entries, protocol);
        if let Some(phone) = phone {
            PhoneBookBridge::fold(&mut entries, phone);
        }
        LinkMergeBridge::fold(&mut entries, &links);
        let directory = ContactDirectory::new(entries).dedupe();
        if directory == *self.snapshot() {
            return RefreshOutcome::Unchanged;
        }

        debug!(entries = directory.len(), pushed = pushed.len(), "Contact pass committed");
        self.commit(directory);
        RefreshOutcome::Committed
    }

    /// Merges a protocol contact and a phone contact into one entry.
    pub async fn link_contacts(
        &self,
        address: &str,
        phone_contact_id: &str,
    ) -> Result<ContactIdentity, ResolveError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let address_key = ContactKey::Address(address.to_string());
        let phone_key = ContactKey::PhoneId(phone_contact_id.to_string());

        if address.trim().is_empty() {
            return Err(contract(ResolveError::NotLinkable(address_key)));
        }
        let protocol_at = current
            .position(&address_key)
            .ok_or_else(|| contract(ResolveError::NotFound(address_key.clone())))?;
        let ContactIdentity::Protocol(protocol) = &current.entries[protocol_at] else {
            return Err(contract(ResolveError::AlreadyLinked(address_key)));
        };
        let phone_at = current
            .entries
            .iter()
            .position(|e| e.phone_contact_id() == Some(phone_contact_id))
            .ok_or_else(|| contract(ResolveError::NotFound(phone_key.clone())))?;
        let ContactIdentity::Phone(phone) = &current.entries[phone_at] else {
            return Err(contract(ResolveError::AlreadyLinked(phone_key)));
        };

        self.links
            .push_link(&LinkRecord {
                phone_contact_id: phone_contact_id.to_string(),
                wallet_address: address.to_string(),
            })
            .map_err(|e| contract(ResolveError::Storage(format!("{e:#}"))))?;

        let merged = ContactIdentity::Merged(MergedContact::new(protocol.clone(), phone.clone()));
        let mut entries = current.entries.clone();
        entries[protocol_at] = merged.clone();
        entries.remove(phone_at);

        info!(address, phone_contact_id, "Linked contacts");
        self.commit(ContactDirectory::new(entries));
        Ok(merged)
    }

    /// Splits a merged entry back into its protocol and phone halves.
    pub async fn unlink_contact(
        &self,
        address: &str,
    ) -> Result<(ContactIdentity, ContactIdentity), ResolveError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let key = ContactKey::Address(address.to_string());

        let at = current
            .position(&key)
            .ok_or_else(|| contract(ResolveError::NotFound(key.clone())))?;
        let ContactIdentity::Merged(merged) = &current.entries[at] else {
            return Err(contract(ResolveError::NotMerged(key)));
        };

        self.links
            .remove_link(&merged.phone.contact_id)
            .map_err(|e| contract(ResolveError::Storage(format!("{e:#}"))))?;

        let protocol = ContactIdentity::Protocol(merged.protocol.clone());
        let mut phone = merged.phone.clone();
        phone.linked_emoji_address = None;
        let phone = ContactIdentity::Phone(phone);

        let mut entries = current.entries.clone();
        entries[at] = protocol.clone();
        entries.insert(at + 1, phone.clone());

        info!(address, "Unlinked contact");
        self.commit(ContactDirectory::new(entries));
        Ok((protocol, phone))
    }

    /// Flips the favorite flag. A merged entry sets both halves.
    ///
    /// The engine is updated first and a rejected update leaves the
    /// directory untouched. The phone half is marked dirty and written back
    /// on the next pass.
    pub async fn toggle_favorite(&self, key: &ContactKey) -> Result<ContactIdentity, ResolveError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let at = current
            .position(key)
            .ok_or_else(|| contract(ResolveError::NotFound(key.clone())))?;

        let mut entry = current.entries[at].clone();
        let favorite = !entry.is_favorite();
        match &mut entry {
            ContactIdentity::Protocol(p) => p.is_favorite = favorite,
            ContactIdentity::Phone(p) => {
                p.is_favorite = favorite;
                p.dirty = true;
            }
            ContactIdentity::Merged(m) => {
                m.protocol.is_favorite = favorite;
                m.phone.is_favorite = favorite;
                m.phone.dirty = true;
            }
        }
        if let Some(protocol) = entry.protocol_half() {
            self.protocol.push(protocol).map_err(engine_rejected)?;
        }

        let mut entries = current.entries.clone();
        entries[at] = entry.clone();
        debug!(key = %key, favorite, "Toggled favorite");
        self.commit(ContactDirectory::new(entries));
        Ok(entry)
    }

    /// Renames an entry, inserting it first if the directory does not hold it.
    pub async fn update_contact_info(
        &self,
        entry: &ContactIdentity,
        alias: &str,
    ) -> Result<ContactIdentity, ResolveError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let mut entries = current.entries.clone();
        let key = entry.key();

        let at = match current.position(&key) {
            Some(at) => at,
            None => {
                debug!(key = %key, "Adding contact on rename");
                entries.push(entry.clone());
                entries.len() - 1
            }
        };

        let alias = alias.trim();
        let alias = (!alias.is_empty()).then(|| alias.to_string());
        let mut updated = entries[at].clone();
        match &mut updated {
            ContactIdentity::Protocol(p) => p.alias = alias,
            ContactIdentity::Phone(p) => {
                p.alias = alias;
                p.dirty = true;
            }
            ContactIdentity::Merged(m) => {
                m.protocol.alias = alias.clone();
                m.phone.alias = alias;
                m.phone.dirty = true;
            }
        }
        if let Some(protocol) = updated.protocol_half() {
            self.protocol.push(protocol).map_err(engine_rejected)?;
        }

        entries[at] = updated.clone();
        info!(key = %key, "Updated contact info");
        self.commit(ContactDirectory::new(entries));
        Ok(updated)
    }

    /// Deletes an entry from every source it touches, then from the directory.
    ///
    /// The engine contact goes first. If the phone book then refuses, the
    /// engine contact is restored and the directory is left as it was.
    /// Sources that never held the contact count as deleted.
    pub async fn delete_contact(&self, key: &ContactKey) -> Result<ContactIdentity, ResolveError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let at = current
            .position(key)
            .ok_or_else(|| contract(ResolveError::NotFound(key.clone())))?;
        let entry = current.entries[at].clone();

        let phone_id = entry.phone_contact_id();
        if phone_id.is_some() && !self.phone.permission().is_granted() {
            return Err(contract(ResolveError::PhoneBook(
                PhoneBookError::PermissionDenied.to_string(),
            )));
        }

        let removed_from_engine = match entry.wallet_address() {
            Some(address) => self.protocol.delete(address).map_err(engine_rejected)?,
            None => false,
        };
        if let Some(id) = phone_id {
            if let Err(e) = self.phone.delete(id).await {
                if removed_from_engine {
                    if let Some(protocol) = entry.protocol_half() {
                        if let Err(restore) = self.protocol.push(protocol) {
                            warn!(key = %key, error = %restore, "Failed to restore engine contact");
                        }
                    }
                }
                return Err(contract(ResolveError::PhoneBook(e.to_string())));
            }
        }
        self.links.forget(&entry);

        let mut entries = current.entries.clone();
        entries.remove(at);
        info!(key = %key, kind = entry.kind(), "Deleted contact");
        self.commit(ContactDirectory::new(entries));
        Ok(entry)
    }

    pub fn contact_by_address(&self, address: &str) -> Option<ContactIdentity> {
        self.snapshot().find_by_address(address).cloned()
    }

    /// The counterparty entry, or a transient protocol contact if unknown.
    pub fn contact_for_transaction(&self, tx: &Tx) -> ContactIdentity {
        contact_in(&self.snapshot(), tx)
    }
}

/// Looks a counterparty up in a directory snapshot. Nothing is stored.
pub fn contact_in(directory: &ContactDirectory, tx: &Tx) -> ContactIdentity {
    match directory.find_by_address(&tx.counterparty_address) {
        Some(entry) => entry.clone(),
        None => ContactIdentity::Protocol(ProtocolContact::new(tx.counterparty_address.clone())),
    }
}

fn engine_rejected(err: EngineError) -> ResolveError {
    contract(ResolveError::Engine(err.to_string()))
}

fn contract(err: ResolveError) -> ResolveError {
    warn!(error = %err, "Contact operation rejected");
    err
}
