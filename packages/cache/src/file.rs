//! One-file-per-key result store.
//!
//! Each entry lives at `<dir>/<key>.geojson`. The file's modification time
//! is the entry's timestamp, so entries written by other processes (or
//! copied in by hand) age the same way. Every write goes to its own
//! temporary file in the same directory and is renamed into place, so
//! concurrent writers of one key never expose a partial file and the last
//! rename wins.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::{CacheError, ResultStore, StoredEntry};

const EXTENSION: &str = "geojson";

/// A [`ResultStore`] that keeps one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry file for `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{EXTENSION}"))
    }
}

impl ResultStore for FileStore {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let path = self.entry_path(key);
        let payload = match std::fs::read_to_string(&path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = std::fs::metadata(&path)?.modified()?;

        Ok(Some(StoredEntry {
            payload,
            stored_at: DateTime::<Utc>::from(modified),
        }))
    }

    fn put(&self, key: &str, payload: &str, _now: DateTime<Utc>) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.entry_path(key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(payload.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;

        log::debug!("Cached result at {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
