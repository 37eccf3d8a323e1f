//! Quota metrics persistence.
//!
//! Best-effort JSON snapshots keyed by key id. Statuses are deliberately not
//! restored: a restarted process recomputes them from the restored counters
//! and the current windows, so a stale `rate_limited` can never stick.

use crate::quota::metrics::ApiKeyMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Error history entries carried into a snapshot.
const PERSISTED_HISTORY: usize = 5;

/// Quota persistence errors.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// I/O error reading or writing the snapshot
    #[error("Quota persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization error
    #[error("Quota snapshot error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// On-disk form of one key's metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedKeyMetrics {
    pub key_masked: String,
    pub daily_quota: u64,
    pub used_today: u64,
    pub quota_reset_time: DateTime<Utc>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub error_history: Vec<String>,
    pub last_used: Option<DateTime<Utc>>,
}

impl PersistedKeyMetrics {
    fn from_metrics(m: &ApiKeyMetrics) -> Self {
        let history_start = m.error_history.len().saturating_sub(PERSISTED_HISTORY);
        Self {
            key_masked: m.key_masked.clone(),
            daily_quota: m.daily_quota,
            used_today: m.used_today,
            quota_reset_time: m.quota_reset_time,
            total_requests: m.total_requests,
            successful_requests: m.successful_requests,
            failed_requests: m.failed_requests,
            average_response_time_ms: m.average_response_time.as_millis() as u64,
            consecutive_errors: m.consecutive_errors,
            last_error: m.last_error.clone(),
            error_history: m.error_history[history_start..].to_vec(),
            last_used: m.last_used,
        }
    }
}

/// Writes a snapshot of all key metrics to `path`.
pub fn save(path: &Path, metrics: &HashMap<String, ApiKeyMetrics>) -> Result<(), QuotaError> {
    let snapshot: HashMap<&String, PersistedKeyMetrics> = metrics
        .iter()
        .map(|(id, m)| (id, PersistedKeyMetrics::from_metrics(m)))
        .collect();
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Loads a snapshot from `path`.
///
/// A missing file is a fresh start; a corrupt file logs and is ignored.
pub fn load(path: &Path) -> Option<HashMap<String, PersistedKeyMetrics>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No quota snapshot, starting fresh");
            return None;
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read quota snapshot");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Corrupt quota snapshot, ignoring");
            None
        }
    }
}

/// Restores cumulative counters from a snapshot into live metrics.
///
/// Status and the minute window are left alone; both are recomputed from
/// the restored state on the next selection.
pub fn restore(metrics: &mut ApiKeyMetrics, saved: &PersistedKeyMetrics) {
    metrics.daily_quota = saved.daily_quota;
    metrics.used_today = saved.used_today;
    metrics.quota_reset_time = saved.quota_reset_time;
    metrics.total_requests = saved.total_requests;
    metrics.successful_requests = saved.successful_requests;
    metrics.failed_requests = saved.failed_requests;
    metrics.average_response_time = Duration::from_millis(saved.average_response_time_ms);
    metrics.consecutive_errors = saved.consecutive_errors;
    metrics.last_error = saved.last_error.clone();
    metrics.error_history = saved.error_history.clone();
    metrics.last_used = saved.last_used;
}
