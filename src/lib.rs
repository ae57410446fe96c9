//! wallet-reconciler: one consistent view of wallet activity and counterparties
//!
//! Reconciles the wallet engine's transaction lifecycle events with three
//! identity sources (engine contacts, the device phone book, and manual
//! links) into a display-ready transaction list and contact directory.
//!
//! - [`ledger`] buckets transactions by status and renders them
//! - [`contacts`] folds the identity sources into a [`model::ContactDirectory`]
//! - [`reconcile`] drives both from external signals and debounces publication

pub mod config;
pub mod contacts;
pub mod engine;
pub mod ledger;
pub mod model;
pub mod phonebook;
pub mod reconcile;
pub mod storage;

pub use config::Config;
pub use reconcile::{ContactSignal, Coordinator, CoordinatorHandle};
