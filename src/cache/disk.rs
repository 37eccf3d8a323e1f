//! Disk cache tier: one file per entry plus a JSON index.
//!
//! The index (`index.json` in the cache directory) maps keys to
//! `{filename, size, created_at, ttl}`. A missing or corrupt index resets to
//! empty - orphaned value files are unreachable and harmless, and will be
//! overwritten if their keys recur.

use crate::cache::types::{CacheError, DiskTierConfig};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const INDEX_FILENAME: &str = "index.json";

/// Index record for one cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIndexEntry {
    /// Value file name inside the cache directory
    pub filename: String,
    /// Value size in bytes
    pub size: usize,
    /// Creation time; expiry is measured from here
    pub created_at: DateTime<Utc>,
    /// Time to live in seconds
    pub ttl_secs: u64,
}

impl DiskIndexEntry {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.created_at + ChronoDuration::seconds(self.ttl_secs as i64)
    }
}

/// Large-value tier backed by the filesystem.
///
/// Eviction is oldest-by-creation and batched: one pass removes roughly a
/// third of the entries instead of churning file-by-file.
pub struct DiskTier {
    dir: PathBuf,
    max_size_bytes: usize,
    index: Mutex<HashMap<String, DiskIndexEntry>>,
}

impl DiskTier {
    /// Opens (or creates) the tier at the configured directory.
    ///
    /// The index is loaded from a previous run when present; a corrupt index
    /// logs and starts empty.
    pub fn open(config: &DiskTierConfig) -> Result<Self, CacheError> {
        fs::create_dir_all(&config.cache_dir)?;
        let index = load_index(&config.cache_dir.join(INDEX_FILENAME));
        debug!(
            dir = %config.cache_dir.display(),
            entries = index.len(),
            "Disk cache tier opened"
        );
        Ok(Self {
            dir: config.cache_dir.clone(),
            max_size_bytes: config.max_size_bytes,
            index: Mutex::new(index),
        })
    }

    /// Looks up `key`, validating TTL against `now`.
    ///
    /// Expired entries and unreadable files are removed and reported as a
    /// miss; `get` never errors.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let entry = {
            let index = self.index.lock().unwrap();
            index.get(key).cloned()?
        };

        if entry.is_expired_at(now) {
            self.remove(key);
            return None;
        }

        match fs::read(self.dir.join(&entry.filename)) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "Cached file unreadable, dropping entry");
                self.remove(key);
                None
            }
        }
    }

    /// Writes `value` under `key`, evicting old entries first if needed.
    ///
    /// Returns the number of entries evicted. Write failures log and leave
    /// the tier unchanged.
    pub fn insert_at(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        if value.len() > self.max_size_bytes {
            debug!(
                key,
                size = value.len(),
                budget = self.max_size_bytes,
                "Value exceeds disk tier budget, skipping"
            );
            return 0;
        }

        let evicted = self.ensure_capacity(value.len());

        let filename = value_filename(key);
        if let Err(err) = fs::write(self.dir.join(&filename), value) {
            warn!(key, error = %err, "Disk cache write failed");
            return evicted;
        }

        {
            let mut index = self.index.lock().unwrap();
            index.insert(
                key.to_string(),
                DiskIndexEntry {
                    filename,
                    size: value.len(),
                    created_at: now,
                    ttl_secs: ttl.as_secs(),
                },
            );
        }
        self.save_index();
        evicted
    }

    /// Removes `key` and its file, if present.
    pub fn remove(&self, key: &str) {
        let entry = self.index.lock().unwrap().remove(key);
        if let Some(entry) = entry {
            if let Err(err) = fs::remove_file(self.dir.join(&entry.filename)) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(key, error = %err, "Failed to remove cached file");
                }
            }
            self.save_index();
        }
    }

    /// Drops entries whose TTL elapsed at `now`. Returns the removed count.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = {
            let index = self.index.lock().unwrap();
            index
                .iter()
                .filter(|(_, e)| e.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Removes every entry and its file.
    pub fn clear(&self) {
        let keys: Vec<String> = self.index.lock().unwrap().keys().cloned().collect();
        for key in keys {
            self.remove(&key);
        }
    }

    /// Evicts oldest-by-creation entries in batched passes until `needed`
    /// bytes fit. Each pass removes roughly a third of the entries.
    fn ensure_capacity(&self, needed: usize) -> usize {
        let mut evicted = 0;
        loop {
            let victims: Vec<String> = {
                let index = self.index.lock().unwrap();
                let current: usize = index.values().map(|e| e.size).sum();
                if current + needed <= self.max_size_bytes || index.is_empty() {
                    return evicted;
                }

                let mut by_age: Vec<(&String, &DiskIndexEntry)> = index.iter().collect();
                by_age.sort_by_key(|(_, e)| e.created_at);
                let batch = (by_age.len() / 3).max(1);
                by_age
                    .into_iter()
                    .take(batch)
                    .map(|(k, _)| k.clone())
                    .collect()
            };

            debug!(count = victims.len(), "Evicting oldest disk cache entries");
            for key in &victims {
                self.remove(key);
                evicted += 1;
            }
        }
    }

    fn save_index(&self) {
        let snapshot = {
            let index = self.index.lock().unwrap();
            serde_json::to_vec_pretty(&*index)
        };
        match snapshot {
            Ok(bytes) => {
                if let Err(err) = fs::write(self.dir.join(INDEX_FILENAME), bytes) {
                    warn!(error = %err, "Failed to persist disk cache index");
                }
            }
            Err(err) => warn!(error = %err, "Failed to serialize disk cache index"),
        }
    }

    /// Aggregate value bytes currently indexed.
    pub fn size_bytes(&self) -> usize {
        self.index.lock().unwrap().values().map(|e| e.size).sum()
    }

    /// Number of entries currently indexed.
    pub fn entry_count(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// Tier budget in bytes.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }
}

fn load_index(path: &PathBuf) -> HashMap<String, DiskIndexEntry> {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "Corrupt disk cache index, starting empty");
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}

/// Derives a filesystem-safe filename from a cache key.
fn value_filename(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}.bin", hex::encode(&hasher.finalize()[..16]))
}
