//! In-process result store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::{CacheError, ResultStore, StoredEntry};

/// A [`ResultStore`] backed by a map, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, StoredEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredEntry>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl ResultStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, payload: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        self.lock()?.insert(
            key.to_string(),
            StoredEntry {
                payload: payload.to_string(),
                stored_at: now,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
