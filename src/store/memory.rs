//! In-memory implementation of the TokenStore trait
//!
//! Each token record sits behind its own lock, so concurrent consumption of
//! different tokens never contends. A coarser read-write lock guards only the
//! structure of the map (inserting a new id, unlinking a deleted one).
//!
//! Deletion tombstones the entry (sets it to `None`) before unlinking it from
//! the map, so a caller still holding the entry from an earlier lookup
//! observes "deleted" instead of resurrecting half-removed state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use super::TokenStore;
use crate::error::StoreError;
use crate::models::TokenRecord;

type Entry = Arc<Mutex<Option<TokenRecord>>>;

/// In-memory token store
#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, Entry>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (for tests and maintenance logging)
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry without touching map structure
    fn entry(&self, token_id: &str) -> Option<Entry> {
        self.records.read().unwrap().get(token_id).cloned()
    }

    /// Unlink a tombstoned entry from the map
    ///
    /// Removes the id only if the map still points at the same entry, so a
    /// re-issued id inserted in between is left alone.
    fn unlink(&self, token_id: &str, entry: &Entry) {
        let mut records = self.records.write().unwrap();
        if let Some(current) = records.get(token_id) {
            if Arc::ptr_eq(current, entry) {
                records.remove(token_id);
            }
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap();
        records.insert(
            record.id.clone(),
            Arc::new(Mutex::new(Some(record.clone()))),
        );
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        match self.entry(token_id) {
            Some(entry) => Ok(entry.lock().unwrap().clone()),
            None => Ok(None),
        }
    }

    async fn consume(&self, token_id: &str) -> Result<TokenRecord, StoreError> {
        let Some(entry) = self.entry(token_id) else {
            return Err(StoreError::NotFound);
        };

        let snapshot = {
            let mut guard = entry.lock().unwrap();

            let Some(record) = guard.as_mut() else {
                // Tombstoned by a concurrent delete
                return Err(StoreError::NotFound);
            };

            if record.is_expired() || record.remaining_uses == 0 {
                *guard = None;
                drop(guard);
                self.unlink(token_id, &entry);
                return Err(StoreError::NotFound);
            }

            record.remaining_uses -= 1;
            let snapshot = record.clone();

            if snapshot.remaining_uses == 0 {
                *guard = None;
            }
            snapshot
        };

        if snapshot.remaining_uses == 0 {
            self.unlink(token_id, &entry);
        }

        Ok(snapshot)
    }

    async fn revoke(&self, token_id: &str) -> Result<(), StoreError> {
        if let Some(entry) = self.entry(token_id) {
            *entry.lock().unwrap() = None;
            self.unlink(token_id, &entry);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let entries: Vec<(String, Entry)> = {
            let records = self.records.read().unwrap();
            records
                .iter()
                .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut purged = 0;
        for (id, entry) in entries {
            let expired = {
                let mut guard = entry.lock().unwrap();
                match guard.as_ref() {
                    Some(record) if record.is_expired() => {
                        *guard = None;
                        true
                    }
                    Some(_) => false,
                    // Already tombstoned; unlink below in case the writer lost
                    // the race to do so
                    None => true,
                }
            };
            if expired {
                self.unlink(&id, &entry);
                purged += 1;
            }
        }

        Ok(purged)
    }
}
