//! Transaction records as reported by the wallet engine

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Engine-assigned transaction identifier.
///
/// Ids are assigned monotonically by the engine, which makes them a usable
/// secondary sort key when two transactions share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Lifecycle status of a transaction.
///
/// ```text
/// PendingInbound  ─────────────────> Broadcast ─> MinedUnconfirmed ─> Mined
/// PendingOutbound ─> ReplyReceived ─> Broadcast ─> MinedUnconfirmed ─> Mined
///                                                  MinedUnconfirmed ─> FauxConfirmed
/// any pending state ─> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    PendingInbound,
    PendingOutbound,
    ReplyReceived,
    Broadcast,
    MinedUnconfirmed,
    FauxUnconfirmed,
    Mined,
    FauxConfirmed,
    Cancelled,
}

impl TxStatus {
    /// States a transaction can hold while sitting in a pending bucket.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            TxStatus::PendingInbound
                | TxStatus::PendingOutbound
                | TxStatus::ReplyReceived
                | TxStatus::Broadcast
        )
    }
}

/// A transaction as reported by the wallet engine.
///
/// Records are replaced wholesale on every lifecycle event; the ledger never
/// edits fields other than `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub id: TxId,
    pub direction: Direction,
    pub status: TxStatus,
    pub timestamp_seconds: u64,
    pub amount: u64,
    pub counterparty_address: String,
    #[serde(default)]
    pub message: String,
    /// Coinbase outputs have no human counterparty.
    #[serde(default)]
    pub is_coinbase: bool,
}

impl Tx {
    pub fn new(id: u64, direction: Direction, status: TxStatus, timestamp_seconds: u64) -> Self {
        Self {
            id: TxId(id),
            direction,
            status,
            timestamp_seconds,
            amount: 0,
            counterparty_address: String::new(),
            message: String::new(),
            is_coinbase: false,
        }
    }

    pub fn with_counterparty(mut self, address: impl Into<String>) -> Self {
        self.counterparty_address = address.into();
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_status(mut self, status: TxStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the counterparty is a real, addressable party.
    pub fn has_known_counterparty(&self) -> bool {
        !self.is_coinbase && !self.counterparty_address.trim().is_empty()
    }
}

/// Display order: newest first, ties broken by descending id.
pub fn display_order(a: &Tx, b: &Tx) -> Ordering {
    b.timestamp_seconds
        .cmp(&a.timestamp_seconds)
        .then_with(|| b.id.cmp(&a.id))
}
