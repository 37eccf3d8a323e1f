//! In-memory cache tier with LRU eviction.

use crate::cache::types::{CacheEntry, MemoryTierConfig};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Fast in-process tier, bounded by aggregate value bytes.
///
/// Eviction is least-recently-used, one entry at a time, until the incoming
/// value fits. All time-sensitive methods take `now` so tests can drive the
/// clock; the tiered cache front-end passes `Utc::now()`.
pub struct MemoryTier {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_size_bytes: usize,
    max_idle: Duration,
}

impl MemoryTier {
    /// Creates an empty tier.
    pub fn new(config: &MemoryTierConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size_bytes: config.max_size_bytes,
            max_idle: config.max_idle,
        }
    }

    /// Looks up `key`, refreshing its LRU position on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.touch_at(now);
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Inserts a value, evicting LRU entries first until it fits.
    ///
    /// A value larger than the whole tier budget is refused. Returns the
    /// number of entries evicted to make room.
    pub fn insert_at(
        &self,
        key: String,
        value: Vec<u8>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        if value.len() > self.max_size_bytes {
            debug!(
                key,
                size = value.len(),
                budget = self.max_size_bytes,
                "Value exceeds memory tier budget, skipping"
            );
            return 0;
        }

        let mut entries = self.entries.lock().unwrap();
        // Replacing an existing entry frees its bytes first
        entries.remove(&key);

        let mut evicted = 0;
        let mut current: usize = entries.values().map(|e| e.size_bytes).sum();
        while current + value.len() > self.max_size_bytes && !entries.is_empty() {
            let lru_key = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
                .unwrap();
            if let Some(old) = entries.remove(&lru_key) {
                current -= old.size_bytes;
                evicted += 1;
            }
        }

        entries.insert(key, CacheEntry::new_at(value, ttl, now));
        evicted
    }

    /// Removes a key, if present.
    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Drops expired entries and entries idle past the configured limit.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now) || e.is_idle_at(self.max_idle, now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            entries.remove(key);
        }
        stale.len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Aggregate value bytes currently held.
    pub fn size_bytes(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .map(|e| e.size_bytes)
            .sum()
    }

    /// Number of entries currently held.
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Tier budget in bytes.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn tier(budget: usize) -> MemoryTier {
        MemoryTier::new(&MemoryTierConfig {
            max_size_bytes: budget,
            max_idle: Duration::from_secs(3600),
        })
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_insert_and_get() {
        let tier = tier(1024);
        let now = Utc::now();
        tier.insert_at("k".into(), vec![1, 2, 3], TTL, now);

        assert_eq!(tier.get_at("k", now), Some(vec![1, 2, 3]));
        assert_eq!(tier.get_at("missing", now), None);
        assert_eq!(tier.entry_count(), 1);
        assert_eq!(tier.size_bytes(), 3);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let tier = tier(1024);
        let now = Utc::now();
        tier.insert_at("k".into(), vec![0; 8], TTL, now);

        let later = now + ChronoDuration::seconds(61);
        assert_eq!(tier.get_at("k", later), None);
        assert_eq!(tier.entry_count(), 0);
    }

    #[test]
    fn test_lru_eviction_until_fit() {
        let tier = tier(30);
        let now = Utc::now();
        tier.insert_at("a".into(), vec![0; 10], TTL, now);
        tier.insert_at("b".into(), vec![0; 10], TTL, now + ChronoDuration::seconds(1));
        tier.insert_at("c".into(), vec![0; 10], TTL, now + ChronoDuration::seconds(2));

        // Touch "a" so "b" becomes least recently used
        tier.get_at("a", now + ChronoDuration::seconds(3));

        let evicted = tier.insert_at(
            "d".into(),
            vec![0; 10],
            TTL,
            now + ChronoDuration::seconds(4),
        );
        assert_eq!(evicted, 1);
        assert!(tier.get_at("b", now + ChronoDuration::seconds(5)).is_none());
        assert!(tier.get_at("a", now + ChronoDuration::seconds(5)).is_some());
    }

    #[test]
    fn test_budget_invariant_holds() {
        let tier = tier(25);
        let now = Utc::now();
        for i in 0..10 {
            tier.insert_at(
                format!("k{}", i),
                vec![0; 10],
                TTL,
                now + ChronoDuration::seconds(i),
            );
            assert!(tier.size_bytes() <= 25);
        }
    }

    #[test]
    fn test_oversized_value_refused() {
        let tier = tier(10);
        let now = Utc::now();
        tier.insert_at("big".into(), vec![0; 100], TTL, now);
        assert_eq!(tier.entry_count(), 0);
    }

    #[test]
    fn test_replacing_key_frees_old_bytes() {
        let tier = tier(20);
        let now = Utc::now();
        tier.insert_at("k".into(), vec![0; 15], TTL, now);
        // Re-inserting the same key must not need an eviction
        let evicted = tier.insert_at("k".into(), vec![0; 15], TTL, now);
        assert_eq!(evicted, 0);
        assert_eq!(tier.size_bytes(), 15);
    }

    #[test]
    fn test_cleanup_drops_expired_and_idle() {
        let tier = tier(1024);
        let now = Utc::now();
        tier.insert_at("short-ttl".into(), vec![0; 4], Duration::from_secs(10), now);
        tier.insert_at("long-ttl".into(), vec![0; 4], Duration::from_secs(86_400), now);

        // Past the short TTL and past the 1h idle window for both
        let later = now + ChronoDuration::seconds(3700);
        let removed = tier.cleanup_at(later);
        assert_eq!(removed, 2);
        assert_eq!(tier.entry_count(), 0);
    }

    #[test]
    fn test_clear() {
        let tier = tier(1024);
        let now = Utc::now();
        tier.insert_at("k".into(), vec![1], TTL, now);
        tier.clear();
        assert_eq!(tier.entry_count(), 0);
        assert_eq!(tier.size_bytes(), 0);
    }
}
