//! Priority message scheduler with smart batch merging.
//!
//! Accepts outbound messages tagged with urgency and delivers them through
//! a caller-supplied [`Transport`], guaranteeing the highest urgency is
//! serviced first while collapsing bursts of low-urgency notifications into
//! merged digests.
//!
//! # Architecture
//!
//! ```text
//! enqueue(Emergency) ──────────────► transport (direct, queues bypassed)
//!                                         │ on failure: demote to High
//! enqueue(High/Normal/Low) ──► [priority queues] ◄─┘
//!                                    ▲    │
//! enqueue(Batch) ──► [batch buffers]─┘    │ strict priority scan
//!        size / timeout flush → merged    ▼
//!                               [worker tasks + permit pool] ──► transport
//!                                         │
//!                     failure: backoff, demote, re-enqueue (new record)
//! ```
//!
//! Worker tasks are cheap queue scanners; the actual dispatch concurrency
//! is bounded by the adaptive permit pool, which an error-rate controller
//! resizes at runtime.

mod adaptive;
mod backoff;
mod batch;
mod message;
mod queue;
mod stats;
mod transport;
mod worker;

pub use adaptive::{AdaptiveConfig, MAX_WORKERS, MIN_WORKERS};
pub use backoff::RetryPolicy;
pub use message::{MessageOptions, MessagePriority, QueuedMessage};
pub use queue::PushOutcome;
pub use stats::{SchedulerHealth, SchedulerStats};
pub use transport::{SendError, SendOptions, Transport};
pub use worker::DispatchOutcome;

use adaptive::{AdaptiveController, OutcomeWindow, WorkerPool};
use batch::{merge_messages, BatchBuffers, BatchInsert};
use queue::PriorityQueues;
use stats::{assess_health, SchedulerCounters};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use worker::{run_worker, WorkerContext};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Per-priority queue capacity (default: 10,000).
    pub max_queue_size: usize,
    /// Initial permit pool size (default: 8).
    pub initial_workers: usize,
    /// Batch buffer flush size (default: 5).
    pub batch_size: usize,
    /// Batch buffer flush timeout (default: 2s).
    pub batch_timeout: Duration,
    /// Enable type-aware batch merging (default: true).
    pub enable_smart_merging: bool,
    /// Retry backoff policy.
    pub retry: RetryPolicy,
    /// Adaptive concurrency settings.
    pub adaptive: AdaptiveConfig,
    /// Grace period for in-flight sends on shutdown (default: 5s).
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            initial_workers: 8,
            batch_size: 5,
            batch_timeout: Duration::from_secs(2),
            enable_smart_merging: true,
            retry: RetryPolicy::default(),
            adaptive: AdaptiveConfig::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    /// Sets the per-priority queue capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the initial worker count.
    pub fn with_initial_workers(mut self, workers: usize) -> Self {
        self.initial_workers = workers;
        self
    }

    /// Sets the batch flush size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the batch flush timeout.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Enables or disables smart merging.
    pub fn with_smart_merging(mut self, enabled: bool) -> Self {
        self.enable_smart_merging = enabled;
        self
    }
}

struct SchedulerInner {
    config: SchedulerConfig,
    transport: Arc<dyn Transport>,
    queues: Arc<PriorityQueues>,
    batches: BatchBuffers,
    batch_timers: Mutex<HashMap<String, JoinHandle<()>>>,
    pool: Arc<WorkerPool>,
    window: Arc<OutcomeWindow>,
    controller: AdaptiveController,
    counters: Arc<SchedulerCounters>,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
    started_at: Mutex<Instant>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Priority message scheduler.
///
/// Cheap to clone; all clones share the same queues and workers.
#[derive(Clone)]
pub struct MessageScheduler {
    inner: Arc<SchedulerInner>,
}

impl MessageScheduler {
    /// Creates a scheduler delivering through `transport`.
    ///
    /// Workers are not started until [`MessageScheduler::start`] is called.
    pub fn new(config: SchedulerConfig, transport: Arc<dyn Transport>) -> Self {
        let pool = Arc::new(WorkerPool::new(config.initial_workers));
        let inner = SchedulerInner {
            queues: Arc::new(PriorityQueues::new(config.max_queue_size)),
            batches: BatchBuffers::new(config.batch_size),
            batch_timers: Mutex::new(HashMap::new()),
            pool,
            window: Arc::new(OutcomeWindow::new()),
            controller: AdaptiveController::new(config.adaptive.clone()),
            counters: Arc::new(SchedulerCounters::default()),
            cancel: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            started_at: Mutex::new(Instant::now()),
            workers: Mutex::new(Vec::new()),
            transport,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Starts the worker tasks and the concurrency monitor.
    ///
    /// Idempotent: calling start on a running scheduler logs and returns.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().unwrap() = cancel.clone();
        *self.inner.started_at.lock().unwrap() = Instant::now();

        let ctx = self.worker_context();
        let mut workers = self.inner.workers.lock().unwrap();

        // Scanner tasks are spawned up to the ceiling; the permit pool is
        // the actual concurrency limit, so growth takes effect immediately.
        let scanner_count = self.inner.config.adaptive.max_workers;
        for i in 0..scanner_count {
            workers.push(tokio::spawn(run_worker(
                ctx.clone(),
                format!("worker-{}", i),
                cancel.clone(),
            )));
        }
        workers.push(tokio::spawn(monitor_loop(
            self.inner.clone(),
            cancel.clone(),
        )));

        info!(
            workers = scanner_count,
            permits = self.inner.pool.size(),
            batch_size = self.inner.config.batch_size,
            smart_merging = self.inner.config.enable_smart_merging,
            "Scheduler started"
        );
    }

    /// Stops the scheduler.
    ///
    /// Cancels worker loops, force-flushes every pending batch buffer (no
    /// batched message is silently lost), then waits for in-flight sends up
    /// to the configured grace period.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping scheduler");

        self.inner.cancel.lock().unwrap().cancel();

        // Cancel outstanding batch timers, then flush their buffers into
        // the queues so nothing buffered is lost.
        {
            let mut timers = self.inner.batch_timers.lock().unwrap();
            for (_, handle) in timers.drain() {
                handle.abort();
            }
        }
        for (key, buffered) in self.inner.batches.drain_all() {
            debug!(batch_key = %key, count = buffered.len(), "Force-flushing batch on shutdown");
            self.enqueue_merged(buffered);
        }

        let workers: Vec<JoinHandle<()>> = self.inner.workers.lock().unwrap().drain(..).collect();
        let grace = self.inner.config.shutdown_grace;
        for handle in workers {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Worker did not stop within grace period, abandoning");
            }
        }

        info!("Scheduler stopped");
    }

    /// Enqueues a message with default options.
    ///
    /// Returns the content-derived message id.
    pub async fn enqueue(
        &self,
        target: impl Into<String>,
        text: impl Into<String>,
        priority: MessagePriority,
    ) -> String {
        self.enqueue_with_options(target, text, priority, MessageOptions::default())
            .await
    }

    /// Enqueues a message with the full option set.
    ///
    /// - `Emergency`: sent immediately, bypassing the queues; a failed
    ///   immediate send demotes the message to `High` and queues it.
    /// - `Batch` (with smart merging): buffered per batch key and flushed
    ///   as one merged `High` message at `batch_size` or `batch_timeout`.
    /// - Everything else: pushed to its priority FIFO; drop-newest when the
    ///   queue is full.
    pub async fn enqueue_with_options(
        &self,
        target: impl Into<String>,
        text: impl Into<String>,
        priority: MessagePriority,
        options: MessageOptions,
    ) -> String {
        let message = QueuedMessage::with_options(target, text, priority, options);
        let message_id = message.message_id.clone();

        match priority {
            MessagePriority::Emergency => self.send_emergency(message).await,
            MessagePriority::Batch if self.inner.config.enable_smart_merging => {
                self.buffer_batch(message)
            }
            _ => self.push(message),
        }

        message_id
    }

    /// Immediate send for emergencies. Never loses the message: a failure
    /// demotes it to `High` and queues it.
    async fn send_emergency(&self, message: QueuedMessage) {
        let options = SendOptions {
            parse_mode: message.parse_mode.clone(),
        };
        let started = Instant::now();
        match self
            .inner
            .transport
            .send(&message.target, &message.text, &options)
            .await
        {
            Ok(()) => {
                self.inner.counters.record_processed(started.elapsed());
                self.inner.window.record(true);
                debug!(message_id = %message.message_id, "Emergency message sent directly");
            }
            Err(err) => {
                self.inner.window.record(false);
                error!(
                    message_id = %message.message_id,
                    error = %err,
                    "Emergency send failed, demoting to high priority"
                );
                let mut demoted = message;
                demoted.priority = MessagePriority::High;
                self.push(demoted);
            }
        }
    }

    /// Buffers a batch message, arming or completing the flush as needed.
    fn buffer_batch(&self, message: QueuedMessage) {
        let key = message.batch_key();
        match self.inner.batches.insert(message) {
            BatchInsert::Armed => {
                let timer = self.spawn_batch_timer(key.clone());
                self.inner.batch_timers.lock().unwrap().insert(key, timer);
            }
            BatchInsert::Buffered => {}
            BatchInsert::Full(buffered) => {
                if let Some(timer) = self.inner.batch_timers.lock().unwrap().remove(&key) {
                    timer.abort();
                }
                debug!(batch_key = %key, count = buffered.len(), "Batch flushed at size");
                self.enqueue_merged(buffered);
            }
        }
    }

    /// Arms the per-key flush timer.
    fn spawn_batch_timer(&self, key: String) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let timeout = self.inner.config.batch_timeout;
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.batch_timers.lock().unwrap().remove(&key);
            if let Some(buffered) = inner.batches.take(&key) {
                debug!(batch_key = %key, count = buffered.len(), "Batch flushed at timeout");
                scheduler.enqueue_merged(buffered);
            }
        })
    }

    /// Merges a drained batch and queues the result at `High`.
    fn enqueue_merged(&self, buffered: Vec<QueuedMessage>) {
        let absorbed = buffered.len().saturating_sub(1) as u64;
        if let Some(merged) = merge_messages(buffered) {
            self.inner
                .counters
                .merged
                .fetch_add(absorbed, Ordering::Relaxed);
            self.push(merged);
        }
    }

    /// Pushes onto the priority queues, tracking drops.
    fn push(&self, message: QueuedMessage) {
        match self.inner.queues.push(message) {
            PushOutcome::Queued => {
                self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::Dropped => {
                self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            transport: self.inner.transport.clone(),
            queues: self.inner.queues.clone(),
            pool: self.inner.pool.clone(),
            window: self.inner.window.clone(),
            counters: self.inner.counters.clone(),
            retry: self.inner.config.retry.clone(),
        }
    }

    /// Whether worker loops are active.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> SchedulerStats {
        let queues = &self.inner.queues;
        let counters = &self.inner.counters;
        SchedulerStats {
            queue_sizes: [
                (
                    MessagePriority::Emergency,
                    queues.len_at(MessagePriority::Emergency),
                ),
                (MessagePriority::High, queues.len_at(MessagePriority::High)),
                (
                    MessagePriority::Normal,
                    queues.len_at(MessagePriority::Normal),
                ),
                (MessagePriority::Low, queues.len_at(MessagePriority::Low)),
                (MessagePriority::Batch, queues.len_at(MessagePriority::Batch)),
            ],
            current_workers: self.inner.pool.size(),
            total_enqueued: counters.enqueued.load(Ordering::Relaxed),
            total_processed: counters.processed.load(Ordering::Relaxed),
            total_failed: counters.failed.load(Ordering::Relaxed),
            total_merged: counters.merged.load(Ordering::Relaxed),
            total_dropped: counters.dropped.load(Ordering::Relaxed),
            worker_adjustments: self.inner.controller.adjustment_count(),
            pending_batches: self.inner.batches.pending_keys(),
            error_rate: self.inner.window.error_rate(),
            average_latency: counters.average_latency(),
        }
    }

    /// Health assessment for the monitoring collaborator.
    pub fn health(&self) -> SchedulerHealth {
        assess_health(
            self.stats(),
            self.is_running(),
            *self.inner.started_at.lock().unwrap(),
            self.inner.config.max_queue_size,
        )
    }
}

/// Periodic adaptive-concurrency evaluation.
async fn monitor_loop(inner: Arc<SchedulerInner>, cancel: CancellationToken) {
    debug!("Concurrency monitor started");
    let interval = inner.config.adaptive.check_interval;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let processed = inner.counters.processed.load(Ordering::Relaxed);
                inner
                    .controller
                    .evaluate(&inner.window, &inner.pool, processed);
            }
        }
    }
    debug!("Concurrency monitor stopped");
}
