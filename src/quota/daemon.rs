//! Quota background maintenance.
//!
//! One daemon, two cadences: frequent snapshot saves and a slower
//! housekeeping sweep (window reconciliation plus stale-error recovery).
//! Both are best-effort; a failed save is retried on the next tick.

use crate::quota::manager::QuotaManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Background saver and housekeeper for a [`QuotaManager`].
pub struct QuotaMaintenanceDaemon {
    manager: Arc<QuotaManager>,
    save_interval: Duration,
    cleanup_interval: Duration,
}

impl QuotaMaintenanceDaemon {
    /// Creates a daemon using the manager's configured intervals.
    pub fn new(manager: Arc<QuotaManager>) -> Self {
        let save_interval = manager.save_interval();
        let cleanup_interval = manager.cleanup_interval();
        Self {
            manager,
            save_interval,
            cleanup_interval,
        }
    }

    /// Sets a custom snapshot save interval.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Sets a custom housekeeping interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Runs until shutdown is signalled. A final snapshot is written on the
    /// way out so the freshest counters survive a restart.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            save_secs = self.save_interval.as_secs(),
            cleanup_secs = self.cleanup_interval.as_secs(),
            "Quota maintenance daemon starting"
        );

        let mut save_tick = tokio::time::interval(self.save_interval);
        let mut cleanup_tick = tokio::time::interval(self.cleanup_interval);
        // Skip the immediate first ticks
        save_tick.tick().await;
        cleanup_tick.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.manager.save();
                    info!("Quota maintenance daemon shutting down");
                    break;
                }

                _ = save_tick.tick() => {
                    self.manager.save();
                }

                _ = cleanup_tick.tick() => {
                    self.manager.housekeeping();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::manager::QuotaConfig;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> Arc<QuotaManager> {
        Arc::new(QuotaManager::new(
            vec!["daemon-test-key-0000".to_string()],
            QuotaConfig::default().with_persistence_path(dir.path().join("quota.json")),
        ))
    }

    #[tokio::test]
    async fn test_daemon_respects_shutdown() {
        let dir = TempDir::new().unwrap();
        let daemon = QuotaMaintenanceDaemon::new(manager(&dir))
            .with_save_interval(Duration::from_millis(50))
            .with_cleanup_interval(Duration::from_millis(50));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(daemon.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_daemon_writes_snapshot_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let daemon = QuotaMaintenanceDaemon::new(manager(&dir))
            .with_save_interval(Duration::from_secs(60))
            .with_cleanup_interval(Duration::from_secs(60));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(daemon.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(dir.path().join("quota.json").exists());
    }

    #[tokio::test]
    async fn test_daemon_saves_periodically() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let daemon = QuotaMaintenanceDaemon::new(manager.clone())
            .with_save_interval(Duration::from_millis(30))
            .with_cleanup_interval(Duration::from_secs(60));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(daemon.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(dir.path().join("quota.json").exists());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
