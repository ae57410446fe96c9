//! Transaction ledger
//!
//! Four status buckets fed by engine lifecycle events:
//! - `pending_inbound` and `pending_outbound` hold transactions in flight
//! - `completed` holds mined (confirmed or not) transactions
//! - `cancelled` holds cancelled transactions
//!
//! A transaction id lives in exactly one bucket at a time. Every mutation
//! clones the current buckets, edits the copy and swaps it in, so readers
//! holding a [`TxLedger::snapshot`] never see a half-applied event.

pub mod view;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::engine::{EngineError, WalletEngine, WalletEvent};
use crate::model::{display_order, Direction, Tx, TxId, TxStatus};

pub use view::{LedgerView, TxListItem, TxListView};

/// Whether a ledger call changed anything the presentation layer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Notify,
    Silent,
}

impl Signal {
    pub fn is_notify(self) -> bool {
        self == Signal::Notify
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    PendingInbound,
    PendingOutbound,
    Completed,
    Cancelled,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::PendingInbound,
        Bucket::PendingOutbound,
        Bucket::Completed,
        Bucket::Cancelled,
    ];

    fn pending_for(direction: Direction) -> Bucket {
        match direction {
            Direction::Inbound => Bucket::PendingInbound,
            Direction::Outbound => Bucket::PendingOutbound,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets {
    pub pending_inbound: Vec<Tx>,
    pub pending_outbound: Vec<Tx>,
    pub completed: Vec<Tx>,
    pub cancelled: Vec<Tx>,
}

impl Buckets {
    pub fn get(&self, bucket: Bucket) -> &[Tx] {
        match bucket {
            Bucket::PendingInbound => &self.pending_inbound,
            Bucket::PendingOutbound => &self.pending_outbound,
            Bucket::Completed => &self.completed,
            Bucket::Cancelled => &self.cancelled,
        }
    }

    fn get_mut(&mut self, bucket: Bucket) -> &mut Vec<Tx> {
        match bucket {
            Bucket::PendingInbound => &mut self.pending_inbound,
            Bucket::PendingOutbound => &mut self.pending_outbound,
            Bucket::Completed => &mut self.completed,
            Bucket::Cancelled => &mut self.cancelled,
        }
    }

    /// Which bucket holds `id`, if any.
    pub fn locate(&self, id: TxId) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|b| self.get(*b).iter().any(|t| t.id == id))
    }

    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.get(*b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&mut self, bucket: Bucket, id: TxId) -> bool {
        let list = self.get_mut(bucket);
        let before = list.len();
        list.retain(|t| t.id != id);
        list.len() != before
    }

    fn replace(&mut self, bucket: Bucket, tx: &Tx) -> bool {
        match self.get_mut(bucket).iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => {
                *existing = tx.clone();
                true
            }
            None => false,
        }
    }

    fn set_status(&mut self, bucket: Bucket, id: TxId, status: TxStatus) -> bool {
        match self.get_mut(bucket).iter_mut().find(|t| t.id == id) {
            Some(existing) => {
                existing.status = status;
                true
            }
            None => false,
        }
    }

    fn upsert(&mut self, bucket: Bucket, tx: &Tx) {
        if !self.replace(bucket, tx) {
            self.get_mut(bucket).push(tx.clone());
        }
    }

    /// Drops `id` from every bucket except `keep`.
    fn strip_except(&mut self, keep: Bucket, id: TxId) {
        for bucket in Bucket::ALL {
            if bucket != keep && self.remove(bucket, id) {
                warn!(tx_id = %id, from = ?bucket, to = ?keep, "Removed stray copy of transaction");
            }
        }
    }

    /// Moves `tx` into `target` after removing it from `sources`.
    fn settle(&mut self, sources: &[Bucket], target: Bucket, tx: &Tx) {
        for source in sources {
            self.remove(*source, tx.id);
        }
        self.strip_except(target, tx.id);
        self.upsert(target, tx);
    }

    /// Enforces one bucket per id on engine-supplied data.
    ///
    /// Settled buckets win over pending ones; the first copy within a bucket wins.
    fn normalize(&mut self) {
        let order = [
            Bucket::Completed,
            Bucket::Cancelled,
            Bucket::PendingOutbound,
            Bucket::PendingInbound,
        ];
        let mut seen = std::collections::HashSet::new();
        for bucket in order {
            self.get_mut(bucket).retain(|t| {
                let fresh = seen.insert(t.id);
                if !fresh {
                    warn!(tx_id = %t.id, bucket = ?bucket, "Engine reported transaction twice");
                }
                fresh
            });
        }
    }
}

#[derive(Default)]
pub struct TxLedger {
    buckets: RwLock<Arc<Buckets>>,
}

impl TxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current buckets. The returned snapshot never changes.
    pub fn snapshot(&self) -> Arc<Buckets> {
        Arc::clone(&self.read())
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<Buckets>> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<Buckets>> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy, edit, swap. The write lock serialises writers only.
    fn mutate(&self, f: impl FnOnce(&mut Buckets) -> Signal) -> Signal {
        let mut guard = self.write();
        let mut next = Buckets::clone(&guard);
        let signal = f(&mut next);
        if signal.is_notify() || next != **guard {
            *guard = Arc::new(next);
        }
        signal
    }

    /// Dispatches one engine event.
    ///
    /// `TxSendSuccessful` and `Updated` need the engine and are handled by
    /// [`Self::on_send_success`] and [`Self::refresh_all`].
    pub fn apply(&self, event: &WalletEvent) -> Signal {
        match event {
            WalletEvent::TxReceived(tx) => self.on_received(tx),
            WalletEvent::TxReplyReceived(tx) => self.on_reply_received(tx),
            WalletEvent::TxFinalized(tx) => self.on_finalized(tx),
            WalletEvent::InboundTxBroadcast(tx) => self.on_inbound_broadcast(tx),
            WalletEvent::OutboundTxBroadcast(tx) => self.on_outbound_broadcast(tx),
            WalletEvent::TxMinedUnconfirmed(tx) => self.on_mined_unconfirmed(tx),
            WalletEvent::TxMined(tx) => self.on_mined(tx),
            WalletEvent::TxFauxMinedUnconfirmed(tx) => self.on_faux_mined_unconfirmed(tx),
            WalletEvent::TxFauxConfirmed(tx) => self.on_faux_confirmed(tx),
            WalletEvent::TxCancelled(tx) => self.on_cancelled(tx),
            WalletEvent::Updated | WalletEvent::TxSendSuccessful(_) => Signal::Silent,
        }
    }

    pub fn on_received(&self, tx: &Tx) -> Signal {
        self.mutate(|b| {
            if let Some(bucket) = b.locate(tx.id) {
                debug!(tx_id = %tx.id, bucket = ?bucket, "Received transaction already tracked");
                return Signal::Silent;
            }
            b.pending_inbound.push(tx.clone());
            Signal::Notify
        })
    }

    pub fn on_reply_received(&self, tx: &Tx) -> Signal {
        self.set_pending_status(Bucket::PendingOutbound, tx, tx.status, Signal::Notify)
    }

    pub fn on_finalized(&self, tx: &Tx) -> Signal {
        self.set_pending_status(Bucket::PendingInbound, tx, tx.status, Signal::Notify)
    }

    /// Status bookkeeping only; no change signal.
    pub fn on_inbound_broadcast(&self, tx: &Tx) -> Signal {
        self.set_pending_status(Bucket::PendingInbound, tx, TxStatus::Broadcast, Signal::Silent)
    }

    /// Status bookkeeping only; no change signal.
    pub fn on_outbound_broadcast(&self, tx: &Tx) -> Signal {
        self.set_pending_status(Bucket::PendingOutbound, tx, TxStatus::Broadcast, Signal::Silent)
    }

    /// Updates the status of the stored record. Other fields keep the values
    /// the ledger already holds.
    fn set_pending_status(&self, bucket: Bucket, tx: &Tx, status: TxStatus, on_hit: Signal) -> Signal {
        self.mutate(|b| {
            if b.set_status(bucket, tx.id, status) {
                on_hit
            } else {
                debug!(tx_id = %tx.id, bucket = ?bucket, "Transaction not found in bucket");
                Signal::Silent
            }
        })
    }

    pub fn on_mined_unconfirmed(&self, tx: &Tx) -> Signal {
        self.complete_directional(tx, TxStatus::MinedUnconfirmed)
    }

    pub fn on_faux_mined_unconfirmed(&self, tx: &Tx) -> Signal {
        self.complete_directional(tx, TxStatus::FauxUnconfirmed)
    }

    fn complete_directional(&self, tx: &Tx, status: TxStatus) -> Signal {
        let updated = tx.clone().with_status(status);
        self.mutate(|b| {
            b.settle(&[Bucket::pending_for(tx.direction)], Bucket::Completed, &updated);
            Signal::Notify
        })
    }

    pub fn on_mined(&self, tx: &Tx) -> Signal {
        self.complete_any_direction(tx, TxStatus::Mined)
    }

    pub fn on_faux_confirmed(&self, tx: &Tx) -> Signal {
        self.complete_any_direction(tx, TxStatus::FauxConfirmed)
    }

    fn complete_any_direction(&self, tx: &Tx, status: TxStatus) -> Signal {
        let updated = tx.clone().with_status(status);
        self.mutate(|b| {
            b.settle(
                &[Bucket::PendingInbound, Bucket::PendingOutbound],
                Bucket::Completed,
                &updated,
            );
            Signal::Notify
        })
    }

    /// Upserts into `cancelled`, so a repeated cancel keeps one copy.
    pub fn on_cancelled(&self, tx: &Tx) -> Signal {
        let updated = tx.clone().with_status(TxStatus::Cancelled);
        self.mutate(|b| {
            b.settle(&[Bucket::pending_for(tx.direction)], Bucket::Cancelled, &updated);
            Signal::Notify
        })
    }

    /// Adds the freshly sent transaction to `pending_outbound`.
    ///
    /// Falls back to [`Self::refresh_all`] if the engine cannot return it; only
    /// that fallback can fail.
    pub fn on_send_success(&self, id: TxId, engine: &dyn WalletEngine) -> Result<Signal, EngineError> {
        match engine.pending_outbound_tx_by_id(id) {
            Ok(tx) => Ok(self.mutate(|b| {
                b.strip_except(Bucket::PendingOutbound, tx.id);
                b.upsert(Bucket::PendingOutbound, &tx);
                Signal::Notify
            })),
            Err(e) => {
                warn!(tx_id = %id, error = %e, "Sent transaction lookup failed, refreshing ledger");
                self.refresh_all(engine).map(|()| Signal::Notify)
            }
        }
    }

    /// Replaces all four buckets from the engine.
    ///
    /// Nothing is swapped unless every getter succeeds.
    pub fn refresh_all(&self, engine: &dyn WalletEngine) -> Result<(), EngineError> {
        let mut next = Buckets {
            cancelled: engine.cancelled_txs()?,
            completed: engine.completed_txs()?,
            pending_inbound: engine.pending_inbound_txs()?,
            pending_outbound: engine.pending_outbound_txs()?,
        };
        next.normalize();
        info!(
            pending_inbound = next.pending_inbound.len(),
            pending_outbound = next.pending_outbound.len(),
            completed = next.completed.len(),
            cancelled = next.cancelled.len(),
            "Ledger refreshed from engine"
        );
        *self.write() = Arc::new(next);
        Ok(())
    }

    /// Pending and settled display groups, each newest first.
    pub fn render(&self) -> LedgerView {
        let b = self.snapshot();
        let (unconfirmed, confirmed): (Vec<&Tx>, Vec<&Tx>) = b
            .completed
            .iter()
            .partition(|t| t.status == TxStatus::MinedUnconfirmed);

        let mut pending: Vec<Tx> = b
            .pending_inbound
            .iter()
            .chain(b.pending_outbound.iter())
            .chain(unconfirmed)
            .cloned()
            .collect();
        let mut settled: Vec<Tx> = b.cancelled.iter().chain(confirmed).cloned().collect();

        pending.sort_by(display_order);
        settled.sort_by(display_order);
        LedgerView { pending, settled }
    }
}
