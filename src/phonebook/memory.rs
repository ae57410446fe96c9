//! In-memory phone book for tests and the replay binary

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{PhoneBookEntry, PhoneBookError, PhoneBookProvider};

#[derive(Default)]
pub struct MemoryPhoneBook {
    entries: Mutex<Vec<PhoneBookEntry>>,
    snapshots: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryPhoneBook {
    pub fn new(entries: Vec<PhoneBookEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    pub fn upsert(&self, entry: PhoneBookEntry) {
        let mut entries = self.lock();
        match entries.iter_mut().find(|e| e.contact_id == entry.contact_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn get(&self, contact_id: &str) -> Option<PhoneBookEntry> {
        self.lock()
            .iter()
            .find(|e| e.contact_id == contact_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of snapshot reads served so far.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    /// Makes every call fail with an I/O error while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every snapshot read, to simulate slow device I/O.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PhoneBookEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), PhoneBookError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PhoneBookError::Io("phone book unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PhoneBookProvider for MemoryPhoneBook {
    async fn snapshot(&self) -> Result<Vec<PhoneBookEntry>, PhoneBookError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        Ok(self.lock().clone())
    }

    async fn write_back(&self, entry: &PhoneBookEntry) -> Result<(), PhoneBookError> {
        self.check()?;
        let mut entries = self.lock();
        let existing = entries
            .iter_mut()
            .find(|e| e.contact_id == entry.contact_id)
            .ok_or_else(|| PhoneBookError::NotFound(entry.contact_id.clone()))?;
        existing.display_name = entry.display_name.clone();
        existing.starred = entry.starred;
        Ok(())
    }

    async fn delete(&self, contact_id: &str) -> Result<(), PhoneBookError> {
        self.check()?;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.contact_id != contact_id);
        if entries.len() == before {
            return Err(PhoneBookError::NotFound(contact_id.to_string()));
        }
        Ok(())
    }
}
