//! The tiered cache front-end.
//!
//! Lookup walks memory, then the remote store, then disk, promoting hits
//! upward so repeated access gets cheaper. Every fault on the read or write
//! path degrades to a miss or a no-op with a warn log; callers never see a
//! cache error.

use crate::cache::disk::DiskTier;
use crate::cache::memory::MemoryTier;
use crate::cache::remote::RemoteStore;
use crate::cache::stats::{CacheReport, CacheStats, TierUsage};
use crate::cache::types::{
    CacheConfig, CacheError, CacheLevel, AUTO_MEMORY_THRESHOLD, AUTO_REMOTE_THRESHOLD,
    PROMOTE_MEMORY_THRESHOLD,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Three-tier content cache: memory, optional remote store, disk.
pub struct TieredCache {
    config: CacheConfig,
    memory: MemoryTier,
    remote: Option<Arc<dyn RemoteStore>>,
    disk: DiskTier,
    stats: Mutex<CacheStats>,
}

impl TieredCache {
    /// Opens a cache with no remote tier.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let memory = MemoryTier::new(&config.memory);
        let disk = DiskTier::open(&config.disk)?;
        info!(
            memory_mb = config.memory.max_size_bytes / (1024 * 1024),
            disk_mb = config.disk.max_size_bytes / (1024 * 1024),
            "Tiered cache initialized"
        );
        Ok(Self {
            config,
            memory,
            remote: None,
            disk,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    /// Attaches a remote middle tier.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Looks up `key` across all tiers.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.get_at(key, Utc::now()).await
    }

    /// Lookup against an explicit clock, walking memory, remote, disk.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        if let Some(value) = self.memory.get_at(key, now) {
            self.stats.lock().unwrap().record_memory_hit();
            return Some(value);
        }

        if let Some(remote) = &self.remote {
            match remote.get(key).await {
                Ok(Some(value)) => {
                    self.promote_to_memory(key, &value, now);
                    self.stats.lock().unwrap().record_remote_hit();
                    return Some(value);
                }
                Ok(None) => {}
                Err(err) => warn!(key, error = %err, "Remote cache read failed"),
            }
        }

        if let Some(value) = self.disk.get_at(key, now) {
            self.promote_to_remote(key, &value).await;
            self.promote_to_memory(key, &value, now);
            self.stats.lock().unwrap().record_disk_hit();
            return Some(value);
        }

        self.stats.lock().unwrap().record_miss();
        None
    }

    /// Stores `value` under `key`.
    ///
    /// `ttl` falls back to the configured default. `CacheLevel::Auto` places
    /// by size: small values to memory, mid-size to the remote store when one
    /// is configured, everything else to disk. Never errors.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>, level: CacheLevel) {
        self.set_at(key, value, ttl, level, Utc::now()).await
    }

    /// Store against an explicit clock.
    pub async fn set_at(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        level: CacheLevel,
        now: DateTime<Utc>,
    ) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let level = match level {
            CacheLevel::Auto => {
                if value.len() < AUTO_MEMORY_THRESHOLD {
                    CacheLevel::Memory
                } else if value.len() < AUTO_REMOTE_THRESHOLD && self.remote.is_some() {
                    CacheLevel::Remote
                } else {
                    CacheLevel::Disk
                }
            }
            explicit => explicit,
        };

        match level {
            CacheLevel::Memory => {
                let evicted = self.memory.insert_at(key.to_string(), value, ttl, now);
                self.stats.lock().unwrap().record_evictions(evicted);
            }
            CacheLevel::Remote => {
                let Some(remote) = &self.remote else {
                    debug!(key, "No remote store configured, storing to disk instead");
                    let evicted = self.disk.insert_at(key, &value, ttl, now);
                    self.stats.lock().unwrap().record_evictions(evicted);
                    return;
                };
                if let Err(err) = remote.set(key, &value, ttl).await {
                    warn!(key, error = %err, "Remote cache write failed");
                }
            }
            CacheLevel::Disk => {
                let evicted = self.disk.insert_at(key, &value, ttl, now);
                self.stats.lock().unwrap().record_evictions(evicted);
            }
            CacheLevel::Auto => unreachable!("resolved above"),
        }
    }

    /// Copies a lower-tier hit into memory when it is small enough.
    ///
    /// Promotion copies; the source tier keeps its entry.
    fn promote_to_memory(&self, key: &str, value: &[u8], now: DateTime<Utc>) {
        if value.len() < PROMOTE_MEMORY_THRESHOLD {
            let evicted =
                self.memory
                    .insert_at(key.to_string(), value.to_vec(), self.config.default_ttl, now);
            self.stats.lock().unwrap().record_evictions(evicted);
        }
    }

    /// Copies a disk hit into the remote store, when one is configured.
    async fn promote_to_remote(&self, key: &str, value: &[u8]) {
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.set(key, value, self.config.default_ttl).await {
                warn!(key, error = %err, "Remote promotion failed");
            }
        }
    }

    /// Drops expired entries from the memory and disk tiers.
    ///
    /// Memory cleanup also drops entries idle past the configured limit.
    /// Returns `(memory_removed, disk_removed)`.
    pub fn cleanup_expired(&self) -> (usize, usize) {
        self.cleanup_expired_at(Utc::now())
    }

    /// Housekeeping against an explicit clock.
    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> (usize, usize) {
        let memory_removed = self.memory.cleanup_at(now);
        let disk_removed = self.disk.cleanup_at(now);
        if memory_removed + disk_removed > 0 {
            info!(memory_removed, disk_removed, "Cleaned up expired cache entries");
        }
        (memory_removed, disk_removed)
    }

    /// Wipes every tier and resets the statistics.
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.clear().await {
                warn!(error = %err, "Remote cache clear failed");
            }
        }
        self.disk.clear();
        self.stats.lock().unwrap().reset();
        info!("All cache tiers cleared");
    }

    /// Snapshot of counters and tier occupancy.
    pub fn report(&self) -> CacheReport {
        CacheReport {
            stats: self.stats.lock().unwrap().clone(),
            memory: TierUsage {
                used_bytes: self.memory.size_bytes(),
                max_bytes: self.memory.max_size_bytes(),
                entries: self.memory.entry_count(),
            },
            disk: TierUsage {
                used_bytes: self.disk.size_bytes(),
                max_bytes: self.disk.max_size_bytes(),
                entries: self.disk.entry_count(),
            },
            remote_configured: self.remote.is_some(),
        }
    }

    /// Configured maintenance interval, for the daemon.
    pub fn maintenance_interval(&self) -> Duration {
        self.config.maintenance_interval
    }
}
