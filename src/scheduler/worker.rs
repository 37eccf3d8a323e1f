//! Worker dispatch loop and send outcome handling.
//!
//! Each worker task repeatedly scans the priority queues (most to least
//! urgent), acquires a permit from the current worker pool, and hands the
//! message to the transport. A send failure never propagates out of the
//! loop: it becomes retry bookkeeping or a permanent-failure counter.
//!
//! A message moves pending (queued) to in-flight (handed to the transport)
//! to one of [`DispatchOutcome`]'s ends; `RetryScheduled` re-enters the
//! queue as a demoted successor record, `Sent` and `Failed` are terminal.

use crate::scheduler::adaptive::{OutcomeWindow, WorkerPool};
use crate::scheduler::backoff::RetryPolicy;
use crate::scheduler::message::QueuedMessage;
use crate::scheduler::queue::{PriorityQueues, PushOutcome};
use crate::scheduler::stats::SchedulerCounters;
use crate::scheduler::transport::{SendOptions, Transport};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Idle sleep when every queue is empty.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal or intermediate result of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered; terminal.
    Sent,
    /// Transient failure; a demoted successor was scheduled after backoff.
    RetryScheduled,
    /// Permanent failure or retries exhausted; terminal.
    Failed,
}

/// Shared state a worker needs to dispatch messages.
///
/// Cheap to clone; everything is behind an `Arc`.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub transport: Arc<dyn Transport>,
    pub queues: Arc<PriorityQueues>,
    pub pool: Arc<WorkerPool>,
    pub window: Arc<OutcomeWindow>,
    pub counters: Arc<SchedulerCounters>,
    pub retry: RetryPolicy,
}

/// Runs one worker until cancellation.
pub(crate) async fn run_worker(ctx: WorkerContext, name: String, cancel: CancellationToken) {
    debug!(worker = %name, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let Some(message) = ctx.queues.pop_next() else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
            }
        };

        // Permit from the *current* pool; a resize mid-acquire is harmless
        // because the permit stays tied to the semaphore it came from.
        let semaphore = ctx.pool.current();
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // pool closed, shutting down
        };

        process_message(&ctx, message, &cancel, &name).await;
        drop(permit);
    }

    debug!(worker = %name, "Worker stopped");
}

/// Dispatches one message and converts the outcome into bookkeeping.
pub(crate) async fn process_message(
    ctx: &WorkerContext,
    message: QueuedMessage,
    cancel: &CancellationToken,
    worker: &str,
) -> DispatchOutcome {
    let started = Instant::now();
    let options = SendOptions {
        parse_mode: message.parse_mode.clone(),
    };

    match ctx
        .transport
        .send(&message.target, &message.text, &options)
        .await
    {
        Ok(()) => {
            let latency = started.elapsed();
            ctx.counters.record_processed(latency);
            ctx.window.record(true);
            debug!(
                message_id = %message.message_id,
                latency_ms = latency.as_millis() as u64,
                worker,
                "Message delivered"
            );
            DispatchOutcome::Sent
        }
        Err(err) => {
            ctx.window.record(false);

            if err.is_retryable && message.can_retry() {
                let delay = ctx.retry.delay_for(message.retry_count);
                let successor = message.retry_successor();
                info!(
                    message_id = %successor.message_id,
                    attempt = successor.retry_count,
                    max = successor.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Send failed, retry scheduled"
                );
                schedule_retry(ctx.clone(), successor, delay, cancel.clone());
                DispatchOutcome::RetryScheduled
            } else {
                ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    message_id = %message.message_id,
                    retries = message.retry_count,
                    error = %err,
                    "Message permanently failed"
                );
                DispatchOutcome::Failed
            }
        }
    }
}

/// Re-enqueues the retry successor after its backoff delay.
///
/// The delay is cancellable: a shutdown during the backoff abandons the
/// retry (the grace period covers in-flight sends, not scheduled ones).
fn schedule_retry(
    ctx: WorkerContext,
    successor: QueuedMessage,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(
                    message_id = %successor.message_id,
                    "Retry abandoned by shutdown"
                );
            }
            _ = tokio::time::sleep(delay) => {
                if ctx.queues.push(successor) == PushOutcome::Dropped {
                    ctx.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::message::MessagePriority;
    use crate::scheduler::transport::SendError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Transport fake that fails a configurable number of times, then
    /// succeeds, recording every delivery.
    struct FlakyTransport {
        fail_first: usize,
        attempts: AtomicUsize,
        sent: Mutex<Vec<String>>,
        permanent: bool,
    }

    impl FlakyTransport {
        fn reliable() -> Self {
            Self::failing(0, false)
        }

        fn failing(fail_first: usize, permanent: bool) -> Self {
            Self {
                fail_first,
                attempts: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                permanent,
            }
        }
    }

    impl Transport for FlakyTransport {
        fn send<'a>(
            &'a self,
            _target: &'a str,
            text: &'a str,
            _options: &'a SendOptions,
        ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>> {
            Box::pin(async move {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < self.fail_first {
                    if self.permanent {
                        Err(SendError::permanent("forbidden"))
                    } else {
                        Err(SendError::transient("timeout"))
                    }
                } else {
                    self.sent.lock().unwrap().push(text.to_string());
                    Ok(())
                }
            })
        }
    }

    fn context(transport: Arc<FlakyTransport>) -> WorkerContext {
        WorkerContext {
            transport,
            queues: Arc::new(PriorityQueues::new(100)),
            pool: Arc::new(WorkerPool::new(4)),
            window: Arc::new(OutcomeWindow::new()),
            counters: Arc::new(SchedulerCounters::default()),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(50),
            },
        }
    }

    #[tokio::test]
    async fn test_successful_send_records_outcome() {
        let transport = Arc::new(FlakyTransport::reliable());
        let ctx = context(transport.clone());
        let cancel = CancellationToken::new();
        let msg = QueuedMessage::new("chat-1", "hello", MessagePriority::Normal);

        let outcome = process_message(&ctx, msg, &cancel, "w-0").await;

        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(ctx.counters.processed.load(Ordering::Relaxed), 1);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_demoted_retry() {
        let transport = Arc::new(FlakyTransport::failing(1, false));
        let ctx = context(transport.clone());
        let cancel = CancellationToken::new();
        let msg = QueuedMessage::new("chat-1", "hello", MessagePriority::Normal);

        let outcome = process_message(&ctx, msg, &cancel, "w-0").await;
        assert_eq!(outcome, DispatchOutcome::RetryScheduled);

        // Wait past the backoff, then the successor should be queued at Low
        tokio::time::sleep(Duration::from_millis(50)).await;
        let successor = ctx.queues.pop_next().expect("retry should be queued");
        assert_eq!(successor.priority, MessagePriority::Low);
        assert_eq!(successor.retry_count, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_without_retry() {
        let transport = Arc::new(FlakyTransport::failing(10, true));
        let ctx = context(transport);
        let cancel = CancellationToken::new();
        let msg = QueuedMessage::new("chat-1", "hello", MessagePriority::Normal);

        let outcome = process_message(&ctx, msg, &cancel, "w-0").await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(ctx.counters.failed.load(Ordering::Relaxed), 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ctx.queues.pop_next().is_none());
    }

    #[tokio::test]
    async fn test_retries_exhausted_counts_failed() {
        let transport = Arc::new(FlakyTransport::failing(100, false));
        let ctx = context(transport);
        let cancel = CancellationToken::new();
        let mut msg = QueuedMessage::new("chat-1", "hello", MessagePriority::Normal);
        msg.retry_count = msg.max_retries; // already exhausted

        let outcome = process_message(&ctx, msg, &cancel, "w-0").await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(ctx.counters.failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_and_stops_on_cancel() {
        let transport = Arc::new(FlakyTransport::reliable());
        let ctx = context(transport.clone());
        let cancel = CancellationToken::new();

        for i in 0..5 {
            ctx.queues
                .push(QueuedMessage::new("chat-1", format!("m{}", i), MessagePriority::Normal));
        }

        let handle = tokio::spawn(run_worker(ctx.clone(), "w-0".into(), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.sent.lock().unwrap().len(), 5);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .expect("worker should not panic");
    }

    #[tokio::test]
    async fn test_shutdown_abandons_scheduled_retry() {
        let transport = Arc::new(FlakyTransport::failing(1, false));
        let ctx = context(transport);
        let cancel = CancellationToken::new();
        let msg = QueuedMessage::new("chat-1", "hello", MessagePriority::Normal);

        // Long backoff so cancellation lands inside it
        let mut slow_ctx = ctx.clone();
        slow_ctx.retry = RetryPolicy {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
        };
        process_message(&slow_ctx, msg, &cancel, "w-0").await;

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ctx.queues.pop_next().is_none(), "retry should be abandoned");
    }
}
