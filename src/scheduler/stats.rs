//! Scheduler statistics and health reporting.

use crate::scheduler::message::MessagePriority;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic counters maintained by the scheduler.
///
/// All counters are relaxed atomics; they feed monitoring, not control flow.
#[derive(Debug, Default)]
pub struct SchedulerCounters {
    /// Messages accepted into a queue (including merged batch output).
    pub enqueued: AtomicU64,
    /// Messages delivered successfully.
    pub processed: AtomicU64,
    /// Messages permanently failed (retries exhausted or permanent error).
    pub failed: AtomicU64,
    /// Messages absorbed by batch merging (inputs minus merged outputs).
    pub merged: AtomicU64,
    /// Messages dropped by full-queue back-pressure.
    pub dropped: AtomicU64,
    /// Cumulative send latency in microseconds (successes only).
    pub send_latency_micros: AtomicU64,
}

impl SchedulerCounters {
    /// Records a successful send with its latency.
    pub fn record_processed(&self, latency: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.send_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Average send latency over all successful deliveries.
    pub fn average_latency(&self) -> Duration {
        let processed = self.processed.load(Ordering::Relaxed);
        if processed == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.send_latency_micros.load(Ordering::Relaxed) / processed)
    }
}

/// Point-in-time snapshot of scheduler state for monitoring.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    /// Queue depth per priority level, in dispatch order.
    pub queue_sizes: [(MessagePriority, usize); 5],
    /// Current adaptive worker count.
    pub current_workers: usize,
    /// Total messages accepted into queues.
    pub total_enqueued: u64,
    /// Total messages delivered.
    pub total_processed: u64,
    /// Total messages permanently failed.
    pub total_failed: u64,
    /// Total messages absorbed by merging.
    pub total_merged: u64,
    /// Total messages dropped by back-pressure.
    pub total_dropped: u64,
    /// Worker-count adjustments applied.
    pub worker_adjustments: usize,
    /// Batch keys with buffered messages.
    pub pending_batches: usize,
    /// Error rate over the recent outcome window (0.0-1.0), if enough samples.
    pub error_rate: Option<f64>,
    /// Average successful send latency.
    pub average_latency: Duration,
}

impl SchedulerStats {
    /// Total messages waiting across all levels.
    pub fn total_queued(&self) -> usize {
        self.queue_sizes.iter().map(|(_, n)| n).sum()
    }
}

/// Health classification derived from a stats snapshot.
#[derive(Debug, Clone)]
pub struct SchedulerHealth {
    /// True when running with acceptable error rate and queue headroom.
    pub healthy: bool,
    /// Whether worker loops are active.
    pub is_running: bool,
    /// Time since the scheduler started.
    pub uptime: Duration,
    /// The snapshot this assessment was derived from.
    pub stats: SchedulerStats,
    /// Operator-facing observations.
    pub recommendations: Vec<String>,
}

/// Queue fill ratio above which health degrades.
const QUEUE_PRESSURE_RATIO: f64 = 0.8;

/// Error rate above which health degrades.
const UNHEALTHY_ERROR_RATE: f64 = 0.5;

/// Builds a health report from a snapshot.
pub fn assess_health(
    stats: SchedulerStats,
    is_running: bool,
    started_at: Instant,
    max_queue_size: usize,
) -> SchedulerHealth {
    let error_rate = stats.error_rate.unwrap_or(0.0);
    let total_queued = stats.total_queued();
    let capacity = max_queue_size * stats.queue_sizes.len();

    let healthy = is_running
        && error_rate < UNHEALTHY_ERROR_RATE
        && (total_queued as f64) < capacity as f64 * QUEUE_PRESSURE_RATIO;

    let mut recommendations = Vec::new();
    if error_rate > 0.3 {
        recommendations.push("Error rate elevated; check transport connectivity".to_string());
    }
    if (total_queued as f64) > capacity as f64 * 0.7 {
        recommendations.push("Queues near capacity; consider more workers".to_string());
    }
    if stats.total_merged > 0 && stats.total_processed > 0 {
        let merge_ratio = stats.total_merged as f64 / stats.total_processed as f64;
        if merge_ratio > 0.5 {
            recommendations.push("Batch merging absorbing most traffic".to_string());
        }
    }
    if recommendations.is_empty() {
        recommendations.push("Operating normally".to_string());
    }

    SchedulerHealth {
        healthy,
        is_running,
        uptime: started_at.elapsed(),
        stats,
        recommendations,
    }
}
