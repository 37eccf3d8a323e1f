//! Cache maintenance daemon.
//!
//! Periodically sweeps expired and idle entries out of the memory and disk
//! tiers. Owns no state beyond a handle to the cache; run it with
//! `tokio::spawn(daemon.run(shutdown_token))`.

use crate::cache::system::TieredCache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Background sweeper for the tiered cache.
pub struct CacheMaintenanceDaemon {
    cache: Arc<TieredCache>,
    interval: Duration,
}

impl CacheMaintenanceDaemon {
    /// Creates a daemon sweeping at the cache's configured interval.
    pub fn new(cache: Arc<TieredCache>) -> Self {
        let interval = cache.maintenance_interval();
        Self { cache, interval }
    }

    /// Sets a custom sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs the sweep loop until shutdown is signalled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Cache maintenance daemon starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Cache maintenance daemon shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let (memory, disk) = self.cache.cleanup_expired();
                    if memory + disk == 0 {
                        debug!("Cache sweep found nothing to clean");
                    }
                }
            }
        }
    }
}
