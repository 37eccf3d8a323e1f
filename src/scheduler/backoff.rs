//! Retry backoff policy.
//!
//! Exponential backoff with a small multiplicative jitter and a hard cap.
//! Delays are non-decreasing in attempt number and never exceed
//! [`RetryPolicy::max_delay`].

use rand::Rng;
use std::time::Duration;

/// Default base delay for the first retry (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default cap on any single retry delay (60 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Jitter range applied multiplicatively to each delay.
///
/// The range is tight enough that `base * 2^n * jitter` stays strictly
/// increasing in `n` (worst case ratio `2 * 0.9 / 1.1 > 1`).
const JITTER_MIN: f64 = 0.9;
const JITTER_MAX: f64 = 1.1;

/// Backoff configuration for failed sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Computes the delay before retry attempt `retry_count` (0-based count
    /// of attempts already made).
    ///
    /// `delay = min(base * 2^retry_count * jitter, max_delay)`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX);
        self.delay_with_jitter(retry_count, jitter)
    }

    /// Deterministic variant used by tests and by `delay_for`.
    pub fn delay_with_jitter(&self, retry_count: u32, jitter: f64) -> Duration {
        // Saturate the exponent well below overflow; the cap dominates long
        // before 2^32 anyway.
        let exponent = retry_count.min(32);
        let factor = 2f64.powi(exponent as i32);
        let raw = self.base_delay.as_secs_f64() * factor * jitter;
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}
