//! Rendered ledger views

use serde::{Deserialize, Serialize};

use crate::model::{ContactIdentity, Tx};

/// The two display groups of the ledger, each sorted newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerView {
    pub pending: Vec<Tx>,
    pub settled: Vec<Tx>,
}

impl LedgerView {
    pub fn len(&self) -> usize {
        self.pending.len() + self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attaches a counterparty to every transaction.
    ///
    /// Indices run across both groups, pending first.
    pub fn enrich(
        self,
        mut contact_for: impl FnMut(&Tx) -> ContactIdentity,
        required_confirmations: u64,
        degraded: bool,
    ) -> TxListView {
        let mut index = 0;
        let mut item = |tx: Tx| {
            let contact = contact_for(&tx);
            let built = TxListItem { tx, contact, index };
            index += 1;
            built
        };
        let pending = self.pending.into_iter().map(&mut item).collect();
        let settled = self.settled.into_iter().map(&mut item).collect();
        TxListView {
            pending,
            settled,
            required_confirmations,
            degraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxListItem {
    pub tx: Tx,
    pub contact: ContactIdentity,
    pub index: usize,
}

/// What the presentation layer renders for the transaction list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxListView {
    pub pending: Vec<TxListItem>,
    pub settled: Vec<TxListItem>,
    pub required_confirmations: u64,
    /// Set while the last full refresh failed; the view is stale but consistent.
    pub degraded: bool,
}

impl TxListView {
    pub fn len(&self) -> usize {
        self.pending.len() + self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_ids(&self) -> Vec<u64> {
        self.pending.iter().map(|i| i.tx.id.0).collect()
    }

    pub fn settled_ids(&self) -> Vec<u64> {
        self.settled.iter().map(|i| i.tx.id.0).collect()
    }
}
