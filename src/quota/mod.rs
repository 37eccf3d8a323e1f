//! Multi-key API quota management and load balancing.
//!
//! Tracks per-key daily quotas, minute rate budgets, and reliability, and
//! picks the best key for each request by score. The manager is advisory:
//! it never calls the external API, it only says which key to use and learns
//! from the reported outcome.
//!
//! Windows are UTC: daily quotas reset at UTC midnight, minute budgets at
//! whole-minute boundaries. All time-dependent operations have `*_at(now)`
//! variants so tests can drive the clock.

mod classify;
mod daemon;
mod forecast;
mod manager;
mod metrics;
mod persist;

pub use classify::{classify_error, ErrorKind};
pub use daemon::QuotaMaintenanceDaemon;
pub use forecast::{risk_level, ExhaustionForecast, RiskLevel};
pub use manager::{
    KeyQuotaReport, QuotaConfig, QuotaManager, QuotaStatusReport, QuotaSummary,
};
pub use metrics::{
    mask_key, ApiKeyMetrics, KeyStatus, CONSECUTIVE_ERROR_LIMIT, ERROR_HISTORY_MAX,
    STALE_ERROR_RECOVERY,
};
pub use persist::{PersistedKeyMetrics, QuotaError};
