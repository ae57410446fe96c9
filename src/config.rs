//! Reconciler configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub contacts: ContactsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Wallet session identifier, used in logs
    #[serde(default = "default_session_id")]
    pub id: String,

    /// Directory holding contacts.db
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id: default_session_id(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Window over which "list changed" signals are coalesced
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Capacity of the wallet event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the contact signal channel
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            event_buffer: default_event_buffer(),
            signal_buffer: default_signal_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Used until the engine reports its own count
    #[serde(default = "default_required_confirmations")]
    pub default_required_confirmations: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_required_confirmations: default_required_confirmations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactsConfig {
    /// Initial state of the phone book permission
    #[serde(default)]
    pub phone_book_permission: bool,

    /// Save the directory after every change and restore it on start
    #[serde(default = "default_true")]
    pub persist_directory: bool,

    /// Leave phone contacts without a name out of the visible list
    #[serde(default = "default_true")]
    pub hide_unnamed_phone_contacts: bool,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            phone_book_permission: false,
            persist_directory: true,
            hide_unnamed_phone_contacts: true,
        }
    }
}

fn default_session_id() -> String { "default".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_debounce_ms() -> u64 { 500 }
fn default_event_buffer() -> usize { 256 }
fn default_signal_buffer() -> usize { 64 }
fn default_required_confirmations() -> u64 { 3 }
fn default_true() -> bool { true }

impl Config {
    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
