#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filter-keyed result cache.
//!
//! Serialized analysis output is memoized under the MD5 of the normalized
//! filter descriptor. Entries expire after a fixed time-to-live; expired
//! entries read as absent and can be swept with
//! [`ResultCache::evict_expired`]. Payloads are stored and returned as
//! opaque strings so a hit is byte-for-byte identical to the computation
//! that produced it.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use hotspot_incident_models::FilterDescriptor;
use serde::Serialize;

/// Errors from cache key derivation and store access.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O error on the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The in-memory store's lock was poisoned by a panicking writer.
    #[error("Cache store lock poisoned")]
    Poisoned,
}

/// Derives the cache key for a filter.
///
/// The filter is normalized first (years sorted and de-duplicated, `"all"`
/// and blank values dropped), serialized as JSON with sorted keys, and
/// hashed. Filters that select the same records therefore share a key.
///
/// # Errors
///
/// Returns [`CacheError::Json`] if the filter cannot be serialized.
pub fn cache_key(filter: &FilterDescriptor) -> Result<String, CacheError> {
    // `serde_json::Map` is ordered, so round-tripping through `Value`
    // yields sorted keys.
    let canonical = serde_json::to_value(filter.normalized())?;
    let text = serde_json::to_string(&canonical)?;
    Ok(format!("{:x}", md5::compute(text.as_bytes())))
}

/// Derives the cache key for a filter evaluated under a non-default
/// `scope`, such as a pinned reference time or tuned analysis parameters.
///
/// The scope is hashed with sorted keys next to the normalized filter, so
/// equal scopes share keys and a scoped key never equals a plain
/// [`cache_key`].
///
/// # Errors
///
/// Returns [`CacheError::Json`] if the filter or scope cannot be
/// serialized.
pub fn scoped_cache_key(
    filter: &FilterDescriptor,
    scope: &impl Serialize,
) -> Result<String, CacheError> {
    let canonical = serde_json::json!({
        "filter": serde_json::to_value(filter.normalized())?,
        "scope": serde_json::to_value(scope)?,
    });
    let text = serde_json::to_string(&canonical)?;
    Ok(format!("{:x}", md5::compute(text.as_bytes())))
}

/// A stored payload and the time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// The serialized result, verbatim.
    pub payload: String,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

/// Backing storage for cached results.
///
/// Stores know nothing about expiry; [`ResultCache`] applies the TTL.
pub trait ResultStore: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Fetches the entry for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    /// Writes `payload` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be written.
    fn put(&self, key: &str, payload: &str, now: DateTime<Utc>) -> Result<(), CacheError>;

    /// Deletes the entry for `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be modified.
    fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Lists every stored key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be listed.
    fn keys(&self) -> Result<Vec<String>, CacheError>;
}

impl<S: ResultStore + ?Sized> ResultStore for Arc<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, payload: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        (**self).put(key, payload, now)
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        (**self).keys()
    }
}

/// TTL policy over a [`ResultStore`].
pub struct ResultCache {
    store: Box<dyn ResultStore>,
    ttl: TimeDelta,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("store", &self.store.describe())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    /// Default entry lifetime: one hour.
    pub const DEFAULT_TTL_SECS: u64 = 3600;

    /// Wraps `store` with a TTL of `ttl_secs` seconds.
    #[must_use]
    pub fn new(store: impl ResultStore + 'static, ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            store: Box::new(store),
            ttl,
        }
    }

    /// Returns the cached payload for `key` unless it is missing or older
    /// than the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be read.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>, CacheError> {
        let Some(entry) = self.store.get(key)? else {
            return Ok(None);
        };

        if self.is_expired(&entry, now) {
            log::debug!("Cache entry {key} expired (stored {})", entry.stored_at);
            return Ok(None);
        }

        Ok(Some(entry.payload))
    }

    /// Stores `payload` under `key`, overwriting any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be written.
    pub fn put(&self, key: &str, payload: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        self.store.put(key, payload, now)
    }

    /// Deletes every expired entry and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the store cannot be listed or modified.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.store.keys()? {
            let Some(entry) = self.store.get(&key)? else {
                continue;
            };
            if self.is_expired(&entry, now) && self.store.remove(&key)? {
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!(
                "Evicted {removed} expired cache entr{} from {}",
                if removed == 1 { "y" } else { "ies" },
                self.store.describe()
            );
        }
        Ok(removed)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn ResultStore {
        self.store.as_ref()
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    fn is_expired(&self, entry: &StoredEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.stored_at) > self.ttl
    }
}
