//! In-memory wallet engine
//!
//! Keeps transactions and contacts in a mutex-guarded state and raises events
//! on a broadcast channel. Used by the replay binary and by tests, which can
//! make any getter fail with a chosen code.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use super::{EngineContact, EngineError, WalletEngine, WalletEvent};
use crate::model::{Direction, Tx, TxId, TxStatus};

/// Seed data for a [`MemoryEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub txs: Vec<Tx>,
    #[serde(default)]
    pub contacts: Vec<EngineContact>,
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,
}

fn default_required_confirmations() -> u64 {
    3
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            txs: Vec::new(),
            contacts: Vec::new(),
            required_confirmations: default_required_confirmations(),
        }
    }
}

struct Inner {
    txs: Vec<Tx>,
    contacts: Vec<EngineContact>,
    required_confirmations: u64,
    failures: HashMap<&'static str, i32>,
}

pub struct MemoryEngine {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WalletEvent>,
}

impl MemoryEngine {
    pub fn new(capacity: usize) -> Self {
        Self::with_state(EngineState::default(), capacity)
    }

    pub fn with_state(state: EngineState, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Inner {
                txs: state.txs,
                contacts: state.contacts,
                required_confirmations: state.required_confirmations,
                failures: HashMap::new(),
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    /// Records the event's transaction, then raises the event.
    ///
    /// Returns the number of subscribers that received it.
    pub fn emit(&self, event: WalletEvent) -> usize {
        if let Some(tx) = event.tx() {
            self.record(tx.clone());
        }
        debug!(event = event.name(), "Emitting wallet event");
        self.events.send(event).unwrap_or(0)
    }

    /// Inserts or replaces a transaction by id.
    pub fn record(&self, tx: Tx) {
        let mut inner = self.lock();
        match inner.txs.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => *existing = tx,
            None => inner.txs.push(tx),
        }
    }

    pub fn add_contact(&self, contact: EngineContact) {
        let mut inner = self.lock();
        inner.contacts.retain(|c| c.address != contact.address);
        inner.contacts.push(contact);
    }

    pub fn contact(&self, address: &str) -> Option<EngineContact> {
        self.lock()
            .contacts
            .iter()
            .find(|c| c.address == address)
            .cloned()
    }

    /// Makes every call named `call` answer `code` until [`Self::heal`].
    /// `EngineError::NO_ERROR` lets the call through.
    pub fn fail(&self, call: &'static str, code: i32) {
        self.lock().failures.insert(call, code);
    }

    pub fn heal(&self, call: &'static str) {
        self.lock().failures.remove(call);
    }

    pub fn heal_all(&self) {
        self.lock().failures.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guarded<T>(
        &self,
        call: &'static str,
        f: impl FnOnce(&mut Inner) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.lock();
        let code = inner.failures.get(call).copied().unwrap_or(EngineError::NO_ERROR);
        EngineError::check(call, code)?;
        f(&mut inner)
    }

    fn filtered(&self, call: &'static str, keep: fn(TxStatus) -> bool) -> Result<Vec<Tx>, EngineError> {
        self.guarded(call, |inner| {
            Ok(inner
                .txs
                .iter()
                .filter(|t| keep(t.status))
                .cloned()
                .collect())
        })
    }
}

impl WalletEngine for MemoryEngine {
    fn completed_txs(&self) -> Result<Vec<Tx>, EngineError> {
        self.filtered("completed_txs", |s| {
            matches!(
                s,
                TxStatus::MinedUnconfirmed
                    | TxStatus::FauxUnconfirmed
                    | TxStatus::Mined
                    | TxStatus::FauxConfirmed
            )
        })
    }

    fn cancelled_txs(&self) -> Result<Vec<Tx>, EngineError> {
        self.filtered("cancelled_txs", |s| s == TxStatus::Cancelled)
    }

    fn pending_inbound_txs(&self) -> Result<Vec<Tx>, EngineError> {
        self.guarded("pending_inbound_txs", |inner| {
            Ok(inner
                .txs
                .iter()
                .filter(|t| t.status.is_pending() && t.direction == Direction::Inbound)
                .cloned()
                .collect())
        })
    }

    fn pending_outbound_txs(&self) -> Result<Vec<Tx>, EngineError> {
        self.guarded("pending_outbound_txs", |inner| {
            Ok(inner
                .txs
                .iter()
                .filter(|t| t.status.is_pending() && t.direction == Direction::Outbound)
                .cloned()
                .collect())
        })
    }

    fn pending_outbound_tx_by_id(&self, id: TxId) -> Result<Tx, EngineError> {
        self.guarded("pending_outbound_tx_by_id", |inner| {
            inner
                .txs
                .iter()
                .find(|t| {
                    t.id == id
                        && t.status.is_pending()
                        && t.direction == Direction::Outbound
                })
                .cloned()
                .ok_or_else(|| EngineError::new("pending_outbound_tx_by_id", EngineError::NOT_FOUND))
        })
    }

    fn required_confirmation_count(&self) -> Result<u64, EngineError> {
        self.guarded("required_confirmation_count", |inner| {
            Ok(inner.required_confirmations)
        })
    }

    fn contacts(&self) -> Result<Vec<EngineContact>, EngineError> {
        self.guarded("contacts", |inner| Ok(inner.contacts.clone()))
    }

    fn update_contact(
        &self,
        address: &str,
        alias: &str,
        is_favorite: bool,
    ) -> Result<(), EngineError> {
        self.guarded("update_contact", |inner| {
            let contact = EngineContact {
                address: address.to_string(),
                alias: alias.to_string(),
                is_favorite,
            };
            match inner.contacts.iter_mut().find(|c| c.address == address) {
                Some(existing) => *existing = contact,
                None => inner.contacts.push(contact),
            }
            Ok(())
        })
    }

    fn remove_contact(&self, address: &str) -> Result<(), EngineError> {
        self.guarded("remove_contact", |inner| {
            let before = inner.contacts.len();
            inner.contacts.retain(|c| c.address != address);
            if inner.contacts.len() == before {
                return Err(EngineError::new("remove_contact", EngineError::NOT_FOUND));
            }
            Ok(())
        })
    }
}
