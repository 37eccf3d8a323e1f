//! Core types for the tiered cache.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Cache-related errors.
///
/// These surface only from housekeeping paths; `get` and `set` degrade to
/// miss/no-op instead of erroring.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index serialization error
    #[error("Cache index error: {0}")]
    Index(#[from] serde_json::Error),

    /// Remote store failure
    #[error("Remote cache error: {0}")]
    Remote(String),
}

/// Which tier a value should land in on `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLevel {
    /// Pick a tier from the value size.
    Auto,
    /// In-process memory tier.
    Memory,
    /// Injected remote store, if configured.
    Remote,
    /// Local disk tier.
    Disk,
}

/// Values below this size go to memory under `Auto` placement.
pub const AUTO_MEMORY_THRESHOLD: usize = 50 * 1024;

/// Values below this size go to the remote store under `Auto` placement.
pub const AUTO_REMOTE_THRESHOLD: usize = 500 * 1024;

/// Values below this size are promoted to memory on a lower-tier hit.
pub const PROMOTE_MEMORY_THRESHOLD: usize = 100 * 1024;

/// One cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached bytes
    pub value: Vec<u8>,
    /// Creation time; expiry is measured from here
    pub created_at: DateTime<Utc>,
    /// Last access time, drives LRU eviction and idle cleanup
    pub last_accessed: DateTime<Utc>,
    /// Number of hits served
    pub access_count: u64,
    /// Cached value size in bytes
    pub size_bytes: usize,
    /// Time to live
    pub ttl: Duration,
}

impl CacheEntry {
    /// Creates an entry stamped at `now`.
    pub fn new_at(value: Vec<u8>, ttl: Duration, now: DateTime<Utc>) -> Self {
        let size_bytes = value.len();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
            ttl,
        }
    }

    /// True when the entry's TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match ChronoDuration::from_std(self.ttl) {
            Ok(ttl) => now > self.created_at + ttl,
            Err(_) => false, // TTL too large to overflow; effectively eternal
        }
    }

    /// True when the entry has sat unused longer than `max_idle` at `now`.
    pub fn is_idle_at(&self, max_idle: Duration, now: DateTime<Utc>) -> bool {
        match ChronoDuration::from_std(max_idle) {
            Ok(idle) => now > self.last_accessed + idle,
            Err(_) => false,
        }
    }

    /// Updates access bookkeeping at `now`.
    pub fn touch_at(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.access_count += 1;
    }
}

/// Memory tier configuration.
#[derive(Debug, Clone)]
pub struct MemoryTierConfig {
    /// Maximum aggregate value bytes (default: 100 MB)
    pub max_size_bytes: usize,
    /// Entries unused this long are dropped by cleanup (default: 1 hour)
    pub max_idle: Duration,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024, // 100 MB
            max_idle: Duration::from_secs(3600),
        }
    }
}

/// Disk tier configuration.
#[derive(Debug, Clone)]
pub struct DiskTierConfig {
    /// Cache directory root
    pub cache_dir: PathBuf,
    /// Maximum aggregate file bytes (default: 500 MB)
    pub max_size_bytes: usize,
}

impl Default for DiskTierConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatrelay");

        Self {
            cache_dir,
            max_size_bytes: 500 * 1024 * 1024, // 500 MB
        }
    }
}

/// Complete cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory tier configuration
    pub memory: MemoryTierConfig,
    /// Disk tier configuration
    pub disk: DiskTierConfig,
    /// Default TTL applied when callers pass none (default: 1 hour)
    pub default_ttl: Duration,
    /// Maintenance daemon sweep interval (default: 5 minutes)
    pub maintenance_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryTierConfig::default(),
            disk: DiskTierConfig::default(),
            default_ttl: Duration::from_secs(3600),
            maintenance_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Sets the memory tier budget in bytes.
    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory.max_size_bytes = size;
        self
    }

    /// Sets the disk tier budget in bytes.
    pub fn with_disk_size(mut self, size: usize) -> Self {
        self.disk.max_size_bytes = size;
        self
    }

    /// Sets the cache directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.disk.cache_dir = dir;
        self
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}
