//! SQLite-backed contact store
//!
//! Holds the user-created links between phone contacts and wallet addresses,
//! and the last committed contact directory so a cold start has something to
//! render before the first resolution pass finishes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::ContactDirectory;

/// A manual link between one phone contact and one wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub phone_contact_id: String,
    pub wallet_address: String,
}

pub struct ContactStore {
    db: Mutex<Connection>,
}

impl ContactStore {
    /// Open or create `contacts.db` under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).context("creating data directory")?;
        let db_path = data_dir.join("contacts.db");
        let db = Connection::open(&db_path)
            .with_context(|| format!("opening database at {}", db_path.display()))?;

        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::migrate(&db)?;

        info!(path = %db_path.display(), "Contact store initialized");
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("opening in-memory database")?;
        Self::migrate(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn migrate(db: &Connection) -> Result<()> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS contact_links (
                phone_contact_id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL UNIQUE,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );
            CREATE TABLE IF NOT EXISTS directory_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )
        .context("creating contact tables")?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn links(&self) -> Result<Vec<LinkRecord>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached(
            "SELECT phone_contact_id, wallet_address FROM contact_links ORDER BY updated_at, phone_contact_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LinkRecord {
                phone_contact_id: row.get(0)?,
                wallet_address: row.get(1)?,
            })
        })?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row.context("reading link row")?);
        }
        Ok(links)
    }

    /// Record a link, replacing any earlier link of either side.
    pub fn put_link(&self, link: &LinkRecord) -> Result<()> {
        let mut db = self.conn();
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM contact_links WHERE wallet_address = ?1 AND phone_contact_id != ?2",
            rusqlite::params![link.wallet_address, link.phone_contact_id],
        )?;
        tx.execute(
            "INSERT INTO contact_links (phone_contact_id, wallet_address, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(phone_contact_id) DO UPDATE SET
                wallet_address = excluded.wallet_address,
                updated_at = excluded.updated_at",
            rusqlite::params![link.phone_contact_id, link.wallet_address],
        )?;
        tx.commit()
            .with_context(|| format!("linking {} to {}", link.phone_contact_id, link.wallet_address))?;
        debug!(
            phone_contact_id = %link.phone_contact_id,
            address = %link.wallet_address,
            "Stored contact link"
        );
        Ok(())
    }

    /// Returns true if a link existed.
    pub fn remove_link(&self, phone_contact_id: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM contact_links WHERE phone_contact_id = ?1",
                [phone_contact_id],
            )
            .with_context(|| format!("removing link for {phone_contact_id}"))?;
        Ok(removed > 0)
    }

    /// Remove any link touching this wallet address.
    pub fn remove_links_for_address(&self, address: &str) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM contact_links WHERE wallet_address = ?1", [address])
            .with_context(|| format!("removing links for {address}"))?;
        Ok(removed)
    }

    pub fn save_directory(&self, directory: &ContactDirectory) -> Result<()> {
        let data = serde_json::to_string(directory).context("encoding directory")?;
        self.conn()
            .execute(
                "INSERT INTO directory_snapshot (id, data, updated_at)
                 VALUES (0, ?1, strftime('%s', 'now'))
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                [data],
            )
            .context("saving directory snapshot")?;
        Ok(())
    }

    pub fn load_directory(&self) -> Result<Option<ContactDirectory>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached("SELECT data FROM directory_snapshot WHERE id = 0")?;
        let result = stmt.query_row([], |row| row.get::<_, String>(0));

        match result {
            Ok(data) => {
                let directory =
                    serde_json::from_str(&data).context("decoding directory snapshot")?;
                Ok(Some(directory))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_link_replaces_other_phone_for_same_address() {
        let store = ContactStore::open_in_memory().unwrap();
        store
            .put_link(&LinkRecord {
                phone_contact_id: "1".into(),
                wallet_address: "A".into(),
            })
            .unwrap();
        store
            .put_link(&LinkRecord {
                phone_contact_id: "2".into(),
                wallet_address: "A".into(),
            })
            .unwrap();

        let links = store.links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].phone_contact_id, "2");
    }

    #[test]
    fn test_load_directory_empty() {
        let store = ContactStore::open_in_memory().unwrap();
        assert!(store.load_directory().unwrap().is_none());
    }
}
