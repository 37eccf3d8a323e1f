//! Multi-tier content cache.
//!
//! Three tiers, fastest first:
//! 1. **Memory** - bounded in-process map with LRU eviction
//! 2. **Remote** - optional injected [`RemoteStore`] (network key/value)
//! 3. **Disk** - one file per entry plus a JSON index
//!
//! Lookups walk the tiers top-down and promote hits upward; stores pick a
//! tier from the value size unless the caller names one. The cache is
//! infallible at its public surface: faults degrade to misses and no-ops.
//!
//! Keys are content-addressed ([`content_key`]) and an admission policy
//! ([`should_cache`]) keeps error and junk outcomes out of the cache.

mod daemon;
mod disk;
mod key;
mod memory;
mod policy;
mod remote;
mod stats;
mod system;
mod types;

pub use daemon::CacheMaintenanceDaemon;
pub use disk::{DiskIndexEntry, DiskTier};
pub use key::content_key;
pub use memory::MemoryTier;
pub use policy::{should_cache, OutcomeQuality, OutcomeSummary};
pub use remote::RemoteStore;
pub use stats::{CacheReport, CacheStats, TierUsage};
pub use system::TieredCache;
pub use types::{
    CacheConfig, CacheEntry, CacheError, CacheLevel, DiskTierConfig, MemoryTierConfig,
    AUTO_MEMORY_THRESHOLD, AUTO_REMOTE_THRESHOLD, PROMOTE_MEMORY_THRESHOLD,
};
