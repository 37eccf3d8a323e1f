//! Multi-key quota manager and load balancer.
//!
//! Holds one [`ApiKeyMetrics`] per configured key and answers two questions:
//! which key should the next request use, and what happened with the last
//! one. It never calls the external API itself.

use crate::quota::forecast::{forecast_key_at, ExhaustionForecast};
use crate::quota::metrics::{mask_key, ApiKeyMetrics, KeyStatus, STALE_ERROR_RECOVERY};
use crate::quota::persist;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Quota manager configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Requests allowed per key per UTC day (default: 1000).
    pub daily_quota: u64,
    /// Requests allowed per key per minute (default: 60).
    pub requests_per_minute: u32,
    /// Snapshot file location.
    pub persistence_path: PathBuf,
    /// Interval between periodic snapshot saves (default: 60s).
    pub save_interval: Duration,
    /// Interval between housekeeping sweeps (default: 300s).
    pub cleanup_interval: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_quota: 1000,
            requests_per_minute: 60,
            persistence_path: PathBuf::from("api_quota_stats.json"),
            save_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl QuotaConfig {
    /// Sets the per-key daily quota.
    pub fn with_daily_quota(mut self, quota: u64) -> Self {
        self.daily_quota = quota;
        self
    }

    /// Sets the per-key minute budget.
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Sets the snapshot file location.
    pub fn with_persistence_path(mut self, path: PathBuf) -> Self {
        self.persistence_path = path;
        self
    }
}

/// Per-key section of a status report.
#[derive(Debug, Clone)]
pub struct KeyQuotaReport {
    pub key_id: String,
    pub key_masked: String,
    pub status: KeyStatus,
    pub daily_limit: u64,
    pub used_today: u64,
    pub remaining_today: u64,
    pub quota_reset_time: DateTime<Utc>,
    pub requests_per_minute: u32,
    pub used_this_minute: u32,
    pub total_requests: u64,
    pub success_rate: f64,
    pub average_response_time: Duration,
    pub consecutive_errors: u32,
    pub last_used: Option<DateTime<Utc>>,
}

/// Aggregate section of a status report.
#[derive(Debug, Clone)]
pub struct QuotaSummary {
    pub total_keys: usize,
    pub available_keys: usize,
    pub total_quota_used: u64,
    pub total_requests: u64,
    /// True while at least one key is selectable.
    pub healthy: bool,
}

/// Full status report across all keys.
#[derive(Debug, Clone)]
pub struct QuotaStatusReport {
    pub generated_at: DateTime<Utc>,
    pub keys: Vec<KeyQuotaReport>,
    pub summary: QuotaSummary,
}

/// Quota and load-balancing manager over a fixed key set.
pub struct QuotaManager {
    /// key_id -> raw key material
    keys: HashMap<String, String>,
    metrics: Mutex<HashMap<String, ApiKeyMetrics>>,
    config: QuotaConfig,
}

impl QuotaManager {
    /// Creates a manager over `keys`, restoring any previous snapshot.
    ///
    /// Blank keys are dropped. Key ids are positional (`key_0`, `key_1`, ...)
    /// so snapshots remain valid across restarts with the same key order.
    pub fn new(keys: Vec<String>, config: QuotaConfig) -> Self {
        Self::new_at(keys, config, Utc::now())
    }

    /// Constructor against an explicit clock.
    pub fn new_at(keys: Vec<String>, config: QuotaConfig, now: DateTime<Utc>) -> Self {
        let mut key_map = HashMap::new();
        let mut metrics = HashMap::new();

        for (i, key) in keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .enumerate()
        {
            let key_id = format!("key_{}", i);
            metrics.insert(
                key_id.clone(),
                ApiKeyMetrics::new_at(
                    key_id.clone(),
                    mask_key(&key),
                    config.daily_quota,
                    config.requests_per_minute,
                    now,
                ),
            );
            key_map.insert(key_id, key);
        }

        if let Some(snapshot) = persist::load(&config.persistence_path) {
            let mut restored = 0;
            for (key_id, saved) in &snapshot {
                if let Some(m) = metrics.get_mut(key_id) {
                    persist::restore(m, saved);
                    restored += 1;
                }
            }
            info!(restored, "Restored quota metrics from snapshot");
        }

        info!(keys = key_map.len(), "Quota manager initialized");
        Self {
            keys: key_map,
            metrics: Mutex::new(metrics),
            config,
        }
    }

    /// Picks the best key for the next request.
    ///
    /// Returns `(raw_key, key_id)`, or `None` when every key is exhausted,
    /// rate-limited, errored, or disabled.
    pub fn select_best_key(&self) -> Option<(String, String)> {
        self.select_best_key_at(Utc::now())
    }

    /// Selection against an explicit clock.
    pub fn select_best_key_at(&self, now: DateTime<Utc>) -> Option<(String, String)> {
        let mut metrics = self.metrics.lock().unwrap();
        let mut best: Option<(String, f64)> = None;

        for (key_id, m) in metrics.iter_mut() {
            if matches!(m.status, KeyStatus::Disabled | KeyStatus::Error) {
                continue;
            }

            m.reconcile_windows_at(now);
            if m.status != KeyStatus::Active {
                continue;
            }

            if m.used_today >= m.daily_quota {
                m.status = KeyStatus::QuotaExceeded;
                debug!(key = %m.key_masked, "Daily quota exhausted");
                continue;
            }
            if m.requests_this_minute >= m.requests_per_minute {
                m.status = KeyStatus::RateLimited;
                debug!(key = %m.key_masked, "Minute budget exhausted");
                continue;
            }

            let score = m.score();
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((key_id.clone(), score));
            }
        }

        let (key_id, _) = best?;
        let raw = self.keys.get(&key_id)?.clone();
        Some((raw, key_id))
    }

    /// Records the outcome of a request made with `key_id`.
    ///
    /// Counters always advance; an unknown id is a no-op. A snapshot save is
    /// attempted afterwards and is non-fatal on failure.
    pub fn record_usage(
        &self,
        key_id: &str,
        success: bool,
        latency: Duration,
        error: Option<&str>,
    ) {
        self.record_usage_at(key_id, success, latency, error, Utc::now());
    }

    /// Usage recording against an explicit clock.
    pub fn record_usage_at(
        &self,
        key_id: &str,
        success: bool,
        latency: Duration,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) {
        {
            let mut metrics = self.metrics.lock().unwrap();
            let Some(m) = metrics.get_mut(key_id) else {
                debug!(key_id, "Usage recorded for unknown key, ignoring");
                return;
            };
            if success {
                m.record_success_at(latency, now);
            } else {
                m.record_failure_at(error, now);
                if m.status != KeyStatus::Active {
                    warn!(
                        key = %m.key_masked,
                        status = ?m.status,
                        error = error.unwrap_or("unknown"),
                        "API key status changed after failure"
                    );
                }
            }
        }
        self.save();
    }

    /// Window reconciliation and stale-error recovery across all keys.
    ///
    /// A key parked in `Error` that has not been used for over an hour is
    /// given another chance.
    pub fn housekeeping(&self) {
        self.housekeeping_at(Utc::now());
    }

    /// Housekeeping against an explicit clock.
    pub fn housekeeping_at(&self, now: DateTime<Utc>) {
        let stale = ChronoDuration::from_std(STALE_ERROR_RECOVERY).expect("fits in chrono range");
        let mut metrics = self.metrics.lock().unwrap();
        for m in metrics.values_mut() {
            m.reconcile_windows_at(now);
            let stale_error = m.status == KeyStatus::Error
                && m.last_used.map_or(false, |used| now - used > stale);
            if stale_error {
                m.status = KeyStatus::Active;
                m.consecutive_errors = 0;
                info!(key = %m.key_masked, "Stale error status reset to active");
            }
        }
    }

    /// Writes a metrics snapshot; failures log and are retried next time.
    pub fn save(&self) {
        let metrics = self.metrics.lock().unwrap();
        if let Err(err) = persist::save(&self.config.persistence_path, &metrics) {
            warn!(error = %err, "Failed to persist quota metrics");
        }
    }

    /// Full per-key and aggregate status report.
    pub fn status_report(&self) -> QuotaStatusReport {
        self.status_report_at(Utc::now())
    }

    /// Status report against an explicit clock.
    pub fn status_report_at(&self, now: DateTime<Utc>) -> QuotaStatusReport {
        let metrics = self.metrics.lock().unwrap();
        let mut keys: Vec<KeyQuotaReport> = metrics
            .values()
            .map(|m| KeyQuotaReport {
                key_id: m.key_id.clone(),
                key_masked: m.key_masked.clone(),
                status: m.status,
                daily_limit: m.daily_quota,
                used_today: m.used_today,
                remaining_today: m.daily_quota.saturating_sub(m.used_today),
                quota_reset_time: m.quota_reset_time,
                requests_per_minute: m.requests_per_minute,
                used_this_minute: m.requests_this_minute,
                total_requests: m.total_requests,
                success_rate: m.success_rate(),
                average_response_time: m.average_response_time,
                consecutive_errors: m.consecutive_errors,
                last_used: m.last_used,
            })
            .collect();
        keys.sort_by(|a, b| a.key_id.cmp(&b.key_id));

        let available_keys = metrics
            .values()
            .filter(|m| m.status == KeyStatus::Active)
            .count();
        let summary = QuotaSummary {
            total_keys: metrics.len(),
            available_keys,
            total_quota_used: metrics.values().map(|m| m.used_today).sum(),
            total_requests: metrics.values().map(|m| m.total_requests).sum(),
            healthy: available_keys > 0,
        };

        QuotaStatusReport {
            generated_at: now,
            keys,
            summary,
        }
    }

    /// Exhaustion forecasts for every key with traffic today, soonest first.
    pub fn predict_exhaustion(&self) -> Vec<ExhaustionForecast> {
        self.predict_exhaustion_at(Utc::now())
    }

    /// Forecasting against an explicit clock.
    pub fn predict_exhaustion_at(&self, now: DateTime<Utc>) -> Vec<ExhaustionForecast> {
        let metrics = self.metrics.lock().unwrap();
        let mut forecasts: Vec<ExhaustionForecast> = metrics
            .values()
            .filter_map(|m| forecast_key_at(m, now))
            .collect();
        forecasts.sort_by(|a, b| {
            a.hours_until_exhaustion
                .partial_cmp(&b.hours_until_exhaustion)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        forecasts
    }

    /// Number of managed keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Configured save interval, for the daemon.
    pub fn save_interval(&self) -> Duration {
        self.config.save_interval
    }

    /// Configured housekeeping interval, for the daemon.
    pub fn cleanup_interval(&self) -> Duration {
        self.config.cleanup_interval
    }
}
