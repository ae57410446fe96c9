//! Pure data: transactions and contact identities

pub mod contact;
pub mod tx;

// Re-exports
pub use contact::{
    ContactAction, ContactDirectory, ContactIdentity, ContactKey, MergedContact, PhoneContact,
    ProtocolContact,
};
pub use tx::{display_order, Direction, Tx, TxId, TxStatus};
