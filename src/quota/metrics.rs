//! Per-key usage metrics and status bookkeeping.

use crate::quota::classify::{classify_error, ErrorKind};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consecutive transient failures that put a key into [`KeyStatus::Error`].
pub const CONSECUTIVE_ERROR_LIMIT: u32 = 3;

/// Maximum retained error history entries per key.
pub const ERROR_HISTORY_MAX: usize = 10;

/// A key in [`KeyStatus::Error`] unused this long recovers to active.
pub const STALE_ERROR_RECOVERY: Duration = Duration::from_secs(3600);

/// Availability status of one API key.
///
/// Exactly one status at a time; windows reopening and housekeeping move
/// keys back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Usable right now.
    Active,
    /// Minute budget exhausted; recovers at the next minute boundary.
    RateLimited,
    /// Daily quota exhausted; recovers at the next UTC midnight.
    QuotaExceeded,
    /// Too many consecutive failures; recovers via housekeeping.
    Error,
    /// Administratively off; never selected.
    Disabled,
}

/// Usage metrics for one API key.
///
/// Created once at startup and mutated in place for the life of the
/// process; persistence restores the cumulative counters across restarts
/// while statuses are recomputed.
#[derive(Debug, Clone)]
pub struct ApiKeyMetrics {
    /// Stable identifier (`key_0`, `key_1`, ...).
    pub key_id: String,
    /// Masked display form, safe for logs and reports.
    pub key_masked: String,
    /// Current availability.
    pub status: KeyStatus,

    /// Requests allowed per UTC day.
    pub daily_quota: u64,
    /// Requests counted against today's quota.
    pub used_today: u64,
    /// When `used_today` resets (next UTC midnight).
    pub quota_reset_time: DateTime<Utc>,

    /// Requests allowed per minute.
    pub requests_per_minute: u32,
    /// Requests counted against the current minute.
    pub requests_this_minute: u32,
    /// When `requests_this_minute` resets (next minute boundary).
    pub minute_reset_time: DateTime<Utc>,

    /// Lifetime request count.
    pub total_requests: u64,
    /// Lifetime successes.
    pub successful_requests: u64,
    /// Lifetime failures.
    pub failed_requests: u64,
    /// Running mean latency over successes.
    pub average_response_time: Duration,
    /// Last time this key served a request.
    pub last_used: Option<DateTime<Utc>>,

    /// Failures since the last success.
    pub consecutive_errors: u32,
    /// Most recent error text.
    pub last_error: Option<String>,
    /// Recent error texts, oldest first, bounded at [`ERROR_HISTORY_MAX`].
    pub error_history: Vec<String>,
}

impl ApiKeyMetrics {
    /// Creates fresh metrics for a key, windows anchored at `now`.
    pub fn new_at(
        key_id: impl Into<String>,
        key_masked: impl Into<String>,
        daily_quota: u64,
        requests_per_minute: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_masked: key_masked.into(),
            status: KeyStatus::Active,
            daily_quota,
            used_today: 0,
            quota_reset_time: next_utc_midnight(now),
            requests_per_minute,
            requests_this_minute: 0,
            minute_reset_time: next_minute_boundary(now),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_response_time: Duration::ZERO,
            last_used: None,
            consecutive_errors: 0,
            last_error: None,
            error_history: Vec::new(),
        }
    }

    /// Reopens the day and minute windows that have elapsed at `now`.
    ///
    /// Clears `QuotaExceeded` / `RateLimited` statuses when their window
    /// reopens; `Error` and `Disabled` are not touched.
    pub fn reconcile_windows_at(&mut self, now: DateTime<Utc>) {
        if now >= self.quota_reset_time {
            self.used_today = 0;
            self.quota_reset_time = next_utc_midnight(now);
            if self.status == KeyStatus::QuotaExceeded {
                self.status = KeyStatus::Active;
            }
        }
        if now >= self.minute_reset_time {
            self.requests_this_minute = 0;
            self.minute_reset_time = next_minute_boundary(now);
            if self.status == KeyStatus::RateLimited {
                self.status = KeyStatus::Active;
            }
        }
    }

    /// Fraction of lifetime requests that succeeded; 1.0 before any traffic.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// Selection score: success rate weighted 0.7, remaining quota 0.3,
    /// discounted 10% per consecutive error.
    pub fn score(&self) -> f64 {
        let quota_ratio = if self.daily_quota == 0 {
            1.0
        } else {
            self.used_today as f64 / self.daily_quota as f64
        };
        let base = self.success_rate() * 0.7 + (1.0 - quota_ratio) * 0.3;
        base * 0.9_f64.powi(self.consecutive_errors as i32)
    }

    /// Records a successful request at `now`.
    pub fn record_success_at(&mut self, latency: Duration, now: DateTime<Utc>) {
        self.count_request(now);
        self.successful_requests += 1;
        self.consecutive_errors = 0;

        // Running mean over successes only
        let n = self.successful_requests as u32;
        let prior = self.average_response_time * (n - 1);
        self.average_response_time = (prior + latency) / n;
    }

    /// Records a failed request at `now`, classifying `error` into a
    /// status change where warranted.
    pub fn record_failure_at(&mut self, error: Option<&str>, now: DateTime<Utc>) {
        self.count_request(now);
        self.failed_requests += 1;
        self.consecutive_errors += 1;

        let text = error.unwrap_or("Unknown error");
        self.last_error = Some(text.to_string());
        self.error_history
            .push(format!("{}: {}", now.to_rfc3339(), text));
        if self.error_history.len() > ERROR_HISTORY_MAX {
            self.error_history.remove(0);
        }

        match classify_error(text) {
            ErrorKind::QuotaExceeded => self.status = KeyStatus::QuotaExceeded,
            ErrorKind::RateLimited => self.status = KeyStatus::RateLimited,
            ErrorKind::Transient => {
                if self.consecutive_errors >= CONSECUTIVE_ERROR_LIMIT {
                    self.status = KeyStatus::Error;
                }
            }
        }
    }

    fn count_request(&mut self, now: DateTime<Utc>) {
        self.total_requests += 1;
        self.used_today += 1;
        self.requests_this_minute += 1;
        self.last_used = Some(now);
    }
}

/// Masks a raw key for display: first six and last four characters.
///
/// Operates on characters, not bytes, so multi-byte keys never split a
/// codepoint. Keys of ten characters or fewer are fully masked.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***masked***".to_string()
    }
}

/// Next UTC midnight strictly after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

/// Next whole-minute boundary strictly after `now`.
pub fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .expect("truncation is always valid");
    truncated + ChronoDuration::minutes(1)
}
