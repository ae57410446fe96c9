//! Wallet engine seam
//!
//! The wallet protocol engine is external. It raises [`WalletEvent`]s on a
//! broadcast channel and answers synchronous getters through [`WalletEngine`].
//! Every getter can fail with a non-`NO_ERROR` code; callers log it and treat
//! the call as "no data this pass".

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::model::{Tx, TxId};

pub use memory::MemoryEngine;

/// Non-success code returned by an engine call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("engine call {call} failed with code {code}")]
pub struct EngineError {
    pub code: i32,
    pub call: &'static str,
}

impl EngineError {
    /// The only success code the engine reports.
    pub const NO_ERROR: i32 = 0;

    /// Returned for an unknown id or address.
    pub const NOT_FOUND: i32 = 404;

    pub fn new(call: &'static str, code: i32) -> Self {
        Self { code, call }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Self::NOT_FOUND
    }

    /// Maps a raw engine code to a result.
    pub fn check(call: &'static str, code: i32) -> Result<(), EngineError> {
        if code == Self::NO_ERROR {
            Ok(())
        } else {
            Err(Self::new(call, code))
        }
    }
}

/// A contact as stored by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineContact {
    pub address: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub is_favorite: bool,
}

/// Lifecycle events raised by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WalletEvent {
    TxReceived(Tx),
    TxReplyReceived(Tx),
    TxFinalized(Tx),
    InboundTxBroadcast(Tx),
    OutboundTxBroadcast(Tx),
    TxMinedUnconfirmed(Tx),
    TxMined(Tx),
    TxFauxMinedUnconfirmed(Tx),
    TxFauxConfirmed(Tx),
    TxCancelled(Tx),
    /// Generic "state changed, re-read everything".
    Updated,
    TxSendSuccessful(TxId),
}

impl WalletEvent {
    /// The transaction payload, for the variants that carry one.
    pub fn tx(&self) -> Option<&Tx> {
        match self {
            WalletEvent::TxReceived(tx)
            | WalletEvent::TxReplyReceived(tx)
            | WalletEvent::TxFinalized(tx)
            | WalletEvent::InboundTxBroadcast(tx)
            | WalletEvent::OutboundTxBroadcast(tx)
            | WalletEvent::TxMinedUnconfirmed(tx)
            | WalletEvent::TxMined(tx)
            | WalletEvent::TxFauxMinedUnconfirmed(tx)
            | WalletEvent::TxFauxConfirmed(tx)
            | WalletEvent::TxCancelled(tx) => Some(tx),
            WalletEvent::Updated | WalletEvent::TxSendSuccessful(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::TxReceived(_) => "tx_received",
            WalletEvent::TxReplyReceived(_) => "tx_reply_received",
            WalletEvent::TxFinalized(_) => "tx_finalized",
            WalletEvent::InboundTxBroadcast(_) => "inbound_tx_broadcast",
            WalletEvent::OutboundTxBroadcast(_) => "outbound_tx_broadcast",
            WalletEvent::TxMinedUnconfirmed(_) => "tx_mined_unconfirmed",
            WalletEvent::TxMined(_) => "tx_mined",
            WalletEvent::TxFauxMinedUnconfirmed(_) => "tx_faux_mined_unconfirmed",
            WalletEvent::TxFauxConfirmed(_) => "tx_faux_confirmed",
            WalletEvent::TxCancelled(_) => "tx_cancelled",
            WalletEvent::Updated => "updated",
            WalletEvent::TxSendSuccessful(_) => "tx_send_successful",
        }
    }
}

/// Synchronous getters exposed by the wallet engine.
///
/// Implementations must be cheap to call from a blocking context; the
/// coordinator never calls them while holding an async lock.
pub trait WalletEngine: Send + Sync {
    fn completed_txs(&self) -> Result<Vec<Tx>, EngineError>;
    fn cancelled_txs(&self) -> Result<Vec<Tx>, EngineError>;
    fn pending_inbound_txs(&self) -> Result<Vec<Tx>, EngineError>;
    fn pending_outbound_txs(&self) -> Result<Vec<Tx>, EngineError>;
    fn pending_outbound_tx_by_id(&self, id: TxId) -> Result<Tx, EngineError>;
    fn required_confirmation_count(&self) -> Result<u64, EngineError>;
    fn contacts(&self) -> Result<Vec<EngineContact>, EngineError>;
    fn update_contact(&self, address: &str, alias: &str, is_favorite: bool)
        -> Result<(), EngineError>;
    fn remove_contact(&self, address: &str) -> Result<(), EngineError>;
}
