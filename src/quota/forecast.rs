//! Quota exhaustion forecasting.
//!
//! Projects today's usage rate forward to estimate when each key runs out,
//! so operators can react before selection starts returning nothing.

use crate::quota::metrics::ApiKeyMetrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

/// How urgently a key's quota trajectory needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Exhaustion in under 2 hours.
    Critical,
    /// Exhaustion in under 6 hours.
    High,
    /// Exhaustion in under 12 hours.
    Medium,
    /// Comfortable headroom.
    Low,
}

/// Maps hours-until-exhaustion onto a risk level.
pub fn risk_level(hours_until_exhaustion: f64) -> RiskLevel {
    if hours_until_exhaustion < 2.0 {
        RiskLevel::Critical
    } else if hours_until_exhaustion < 6.0 {
        RiskLevel::High
    } else if hours_until_exhaustion < 12.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Exhaustion projection for one key.
#[derive(Debug, Clone, Serialize)]
pub struct ExhaustionForecast {
    pub key_id: String,
    pub key_masked: String,
    /// Requests per hour, averaged since UTC midnight.
    pub hourly_rate: f64,
    pub remaining_quota: u64,
    pub hours_until_exhaustion: f64,
    pub predicted_exhaustion: DateTime<Utc>,
    pub risk: RiskLevel,
}

/// Projects exhaustion for one key at `now`.
///
/// Returns `None` for keys with no traffic today or no measurable rate.
pub fn forecast_key_at(metrics: &ApiKeyMetrics, now: DateTime<Utc>) -> Option<ExhaustionForecast> {
    if metrics.total_requests == 0 {
        return None;
    }

    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let hours_elapsed = (now - midnight).num_seconds() as f64 / 3600.0;
    if hours_elapsed <= 0.0 {
        return None;
    }

    let hourly_rate = metrics.used_today as f64 / hours_elapsed;
    if hourly_rate <= 0.0 {
        return None;
    }

    let remaining = metrics.daily_quota.saturating_sub(metrics.used_today);
    let hours_until = remaining as f64 / hourly_rate;

    Some(ExhaustionForecast {
        key_id: metrics.key_id.clone(),
        key_masked: metrics.key_masked.clone(),
        hourly_rate,
        remaining_quota: remaining,
        hours_until_exhaustion: hours_until,
        predicted_exhaustion: now + ChronoDuration::seconds((hours_until * 3600.0) as i64),
        risk: risk_level(hours_until),
    })
}
