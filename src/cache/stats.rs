//! Cache statistics.

/// Hit/miss/eviction counters across all tiers.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Lookups answered from memory
    pub memory_hits: u64,
    /// Lookups answered from the remote store
    pub remote_hits: u64,
    /// Lookups answered from disk
    pub disk_hits: u64,
    /// Lookups answered by no tier
    pub misses: u64,
    /// Entries evicted to make room, all tiers
    pub evictions: u64,
    /// Total lookups
    pub total_requests: u64,
}

impl CacheStats {
    pub fn record_memory_hit(&mut self) {
        self.total_requests += 1;
        self.memory_hits += 1;
    }

    pub fn record_remote_hit(&mut self) {
        self.total_requests += 1;
        self.remote_hits += 1;
    }

    pub fn record_disk_hit(&mut self) {
        self.total_requests += 1;
        self.disk_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.total_requests += 1;
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    /// Fraction of lookups answered by any tier (0.0-1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        let hits = self.memory_hits + self.remote_hits + self.disk_hits;
        hits as f64 / self.total_requests as f64
    }

    /// Resets every counter to zero.
    pub fn reset(&mut self) {
        *self = CacheStats::default();
    }
}

/// Occupancy of one tier at snapshot time.
#[derive(Debug, Clone)]
pub struct TierUsage {
    /// Bytes currently held
    pub used_bytes: usize,
    /// Configured budget in bytes
    pub max_bytes: usize,
    /// Entry count
    pub entries: usize,
}

impl TierUsage {
    /// Fill ratio (0.0-1.0).
    pub fn usage_ratio(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.max_bytes as f64
    }
}

/// Full statistics snapshot returned by the tiered cache.
#[derive(Debug, Clone)]
pub struct CacheReport {
    /// Counter snapshot
    pub stats: CacheStats,
    /// Memory tier occupancy
    pub memory: TierUsage,
    /// Disk tier occupancy
    pub disk: TierUsage,
    /// Whether a remote store is configured
    pub remote_configured: bool,
}
