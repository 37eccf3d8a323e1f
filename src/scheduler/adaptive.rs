//! Adaptive worker concurrency control.
//!
//! The scheduler's dispatch concurrency is bounded by a counting permit pool
//! ([`WorkerPool`]). A controller watches the error rate over recent send
//! outcomes and resizes the pool: shrink under sustained errors, grow when
//! healthy and busy. Adjustments are rate-limited by a cooldown window to
//! prevent oscillation.
//!
//! Resizing never mutates the existing semaphore: a new `Arc<Semaphore>` is
//! installed and in-flight permits against the old one drain naturally. The
//! semaphore is constructed lazily, on first use inside the running runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::info;

/// Floor on the worker count.
pub const MIN_WORKERS: usize = 3;

/// Ceiling on the worker count.
pub const MAX_WORKERS: usize = 20;

/// Error rate above which the pool shrinks.
pub const SHRINK_ERROR_RATE: f64 = 0.3;

/// Error rate below which the pool may grow.
pub const GROW_ERROR_RATE: f64 = 0.1;

/// Workers removed per shrink adjustment.
const SHRINK_STEP: usize = 2;

/// Workers added per grow adjustment.
const GROW_STEP: usize = 1;

/// Outcomes examined when computing the error rate.
const SAMPLE_SIZE: usize = 20;

/// Minimum outcomes before the controller acts at all.
const MIN_SAMPLES: usize = 10;

/// Window capacity; trimmed back to half when exceeded.
const WINDOW_CAPACITY: usize = 100;

/// Counting permit pool sized to the current adaptive worker count.
///
/// Workers clone the current `Arc<Semaphore>` each iteration and acquire an
/// owned permit, so a resize mid-flight is harmless.
pub struct WorkerPool {
    semaphore: Mutex<Option<Arc<Semaphore>>>,
    size: AtomicUsize,
}

impl WorkerPool {
    /// Creates a pool that will hand out `initial` permits.
    ///
    /// The underlying semaphore is not built until [`WorkerPool::current`]
    /// is first called from inside a running runtime.
    pub fn new(initial: usize) -> Self {
        Self {
            semaphore: Mutex::new(None),
            size: AtomicUsize::new(initial.max(1)),
        }
    }

    /// Returns the current semaphore, constructing it lazily.
    pub fn current(&self) -> Arc<Semaphore> {
        let mut guard = self.semaphore.lock().unwrap();
        guard
            .get_or_insert_with(|| Arc::new(Semaphore::new(self.size.load(Ordering::Relaxed))))
            .clone()
    }

    /// Installs a fresh semaphore sized to `new_size`.
    ///
    /// Permits already held against the previous semaphore are honored to
    /// completion; only new acquisitions see the new size.
    pub fn resize(&self, new_size: usize) {
        let new_size = new_size.max(1);
        self.size.store(new_size, Ordering::Relaxed);
        let mut guard = self.semaphore.lock().unwrap();
        *guard = Some(Arc::new(Semaphore::new(new_size)));
    }

    /// Current configured worker count.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}

/// Sliding window of send outcomes (`true` = success).
pub struct OutcomeWindow {
    outcomes: Mutex<VecDeque<bool>>,
}

impl Default for OutcomeWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeWindow {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    /// Records one send outcome, trimming the window when it overflows.
    pub fn record(&self, success: bool) {
        let mut outcomes = self.outcomes.lock().unwrap();
        outcomes.push_back(success);
        if outcomes.len() > WINDOW_CAPACITY {
            let excess = outcomes.len() - WINDOW_CAPACITY / 2;
            outcomes.drain(..excess);
        }
    }

    /// Error rate over the most recent [`SAMPLE_SIZE`] outcomes.
    ///
    /// Returns `None` until [`MIN_SAMPLES`] outcomes have been observed.
    pub fn error_rate(&self) -> Option<f64> {
        let outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() < MIN_SAMPLES {
            return None;
        }
        let recent: Vec<bool> = outcomes.iter().rev().take(SAMPLE_SIZE).copied().collect();
        let failures = recent.iter().filter(|ok| !**ok).count();
        Some(failures as f64 / recent.len() as f64)
    }

    /// Number of recorded outcomes currently in the window.
    pub fn len(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    /// True when no outcomes have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configuration for the adaptive controller.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Floor on worker count.
    pub min_workers: usize,
    /// Ceiling on worker count.
    pub max_workers: usize,
    /// Interval between controller evaluations.
    pub check_interval: Duration,
    /// Minimum time between two adjustments.
    pub cooldown: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_workers: MIN_WORKERS,
            max_workers: MAX_WORKERS,
            check_interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Decides worker-count adjustments from recent outcomes.
pub struct AdaptiveController {
    config: AdaptiveConfig,
    last_adjustment: Mutex<Instant>,
    adjustments: AtomicUsize,
}

impl AdaptiveController {
    /// Creates a controller.
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            last_adjustment: Mutex::new(Instant::now()),
            adjustments: AtomicUsize::new(0),
        }
    }

    /// Evaluates the window and resizes the pool if warranted.
    ///
    /// `total_processed` gates growth: the pool only grows once throughput
    /// has demonstrated the extra workers would be used
    /// (`total_processed > workers * 20`).
    ///
    /// Returns `Some((old, new))` when an adjustment was applied.
    pub fn evaluate(
        &self,
        window: &OutcomeWindow,
        pool: &WorkerPool,
        total_processed: u64,
    ) -> Option<(usize, usize)> {
        let error_rate = window.error_rate()?;

        {
            let last = self.last_adjustment.lock().unwrap();
            if last.elapsed() < self.config.cooldown {
                return None;
            }
        }

        let current = pool.size();
        let new_size = if error_rate > SHRINK_ERROR_RATE {
            self.config
                .min_workers
                .max(current.saturating_sub(SHRINK_STEP))
        } else if error_rate < GROW_ERROR_RATE && total_processed > (current as u64) * 20 {
            self.config.max_workers.min(current + GROW_STEP)
        } else {
            return None;
        };

        if new_size == current {
            return None;
        }

        pool.resize(new_size);
        *self.last_adjustment.lock().unwrap() = Instant::now();
        self.adjustments.fetch_add(1, Ordering::Relaxed);

        info!(
            old = current,
            new = new_size,
            error_rate = format!("{:.0}%", error_rate * 100.0),
            "Adjusted worker concurrency"
        );
        Some((current, new_size))
    }

    /// Total adjustments applied so far.
    pub fn adjustment_count(&self) -> usize {
        self.adjustments.load(Ordering::Relaxed)
    }

    /// Test hook: pretend the cooldown has elapsed.
    #[cfg(test)]
    fn expire_cooldown(&self) {
        *self.last_adjustment.lock().unwrap() = Instant::now() - self.config.cooldown;
    }
}
