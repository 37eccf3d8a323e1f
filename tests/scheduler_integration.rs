//! End-to-end scheduler tests: priority ordering, retry, batching, shutdown.

use chatrelay::scheduler::{
    AdaptiveConfig, MessageOptions, MessagePriority, MessageScheduler, SchedulerConfig, SendError,
    SendOptions, Transport,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport fake recording delivery order; fails the first `fail_first`
/// sends with a transient error.
struct ScriptedTransport {
    delivered: Mutex<Vec<String>>,
    fail_first: usize,
    attempts: AtomicUsize,
}

impl ScriptedTransport {
    fn reliable() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            fail_first: 0,
            attempts: AtomicUsize::new(0),
        })
    }

    fn flaky(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            fail_first,
            attempts: AtomicUsize::new(0),
        })
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        _target: &'a str,
        text: &'a str,
        _options: &'a SendOptions,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>> {
        Box::pin(async move {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(SendError::transient("temporary outage"));
            }
            self.delivered.lock().unwrap().push(text.to_string());
            Ok(())
        })
    }
}

/// One scanner, one permit: deterministic dispatch order.
fn single_worker_config() -> SchedulerConfig {
    SchedulerConfig {
        initial_workers: 1,
        adaptive: AdaptiveConfig {
            min_workers: 1,
            max_workers: 1,
            ..Default::default()
        },
        ..Default::default()
    }
    .with_batch_timeout(Duration::from_millis(50))
    .with_batch_size(3)
}

#[tokio::test]
async fn delivers_strictly_by_priority() {
    let transport = ScriptedTransport::reliable();
    let scheduler = MessageScheduler::new(single_worker_config(), transport.clone());

    // Queue in reverse urgency before any worker runs
    scheduler
        .enqueue("chat-1", "low", MessagePriority::Low)
        .await;
    scheduler
        .enqueue("chat-1", "normal", MessagePriority::Normal)
        .await;
    scheduler
        .enqueue("chat-1", "high", MessagePriority::High)
        .await;

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.stop().await;

    assert_eq!(transport.delivered(), vec!["high", "normal", "low"]);
}

#[tokio::test]
async fn transient_failure_retries_and_delivers() {
    let transport = ScriptedTransport::flaky(1);
    let config = SchedulerConfig {
        retry: chatrelay::scheduler::RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..single_worker_config()
    };
    let scheduler = MessageScheduler::new(config, transport.clone());
    scheduler.start().await;

    scheduler
        .enqueue("chat-1", "eventually", MessagePriority::Normal)
        .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.stop().await;

    assert_eq!(transport.delivered(), vec!["eventually"]);
    let stats = scheduler.stats();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 0);
}

#[tokio::test]
async fn batch_timeout_flush_delivers_one_merged_message() {
    let transport = ScriptedTransport::reliable();
    let scheduler = MessageScheduler::new(single_worker_config(), transport.clone());
    scheduler.start().await;

    let options = MessageOptions {
        message_type: Some("card_processing_complete".into()),
        context: Some("upload-7".into()),
        ..Default::default()
    };
    scheduler
        .enqueue_with_options("chat-1", "Card A", MessagePriority::Batch, options.clone())
        .await;
    scheduler
        .enqueue_with_options("chat-1", "Card B", MessagePriority::Batch, options)
        .await;

    // Under batch_size, so only the timer can flush
    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.stop().await;

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1, "one merged digest, not two messages");
    assert!(delivered[0].contains("2 items processed"));
    assert!(delivered[0].contains("Card A"));
    assert_eq!(scheduler.stats().total_merged, 1);
}

#[tokio::test]
async fn full_queue_drops_newest() {
    let transport = ScriptedTransport::reliable();
    let config = single_worker_config().with_max_queue_size(2);
    let scheduler = MessageScheduler::new(config, transport.clone());
    // Not started: pushes accumulate

    for i in 0..5 {
        scheduler
            .enqueue("chat-1", format!("m{}", i), MessagePriority::Normal)
            .await;
    }

    let stats = scheduler.stats();
    assert_eq!(stats.total_enqueued, 2);
    assert_eq!(stats.total_dropped, 3);
    assert_eq!(stats.total_queued(), 2);
}

#[tokio::test]
async fn emergency_bypasses_even_a_stopped_scheduler() {
    let transport = ScriptedTransport::reliable();
    let scheduler = MessageScheduler::new(single_worker_config(), transport.clone());

    scheduler
        .enqueue("chat-1", "fire!", MessagePriority::Emergency)
        .await;

    assert_eq!(transport.delivered(), vec!["fire!"]);
}

#[tokio::test]
async fn stop_is_clean_and_idempotent() {
    let transport = ScriptedTransport::reliable();
    let scheduler = MessageScheduler::new(single_worker_config(), transport.clone());

    scheduler.start().await;
    assert!(scheduler.is_running());

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    // Second stop is a no-op
    scheduler.stop().await;

    let health = scheduler.health();
    assert!(!health.healthy, "stopped scheduler reports unhealthy");
}

#[tokio::test]
async fn health_reflects_load_and_errors() {
    let transport = ScriptedTransport::reliable();
    let scheduler = MessageScheduler::new(single_worker_config(), transport.clone());
    scheduler.start().await;

    for i in 0..10 {
        scheduler
            .enqueue("chat-1", format!("m{}", i), MessagePriority::Normal)
            .await;
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    let health = scheduler.health();
    assert!(health.healthy);
    assert_eq!(health.stats.total_processed, 10);
    assert!(health.stats.average_latency < Duration::from_millis(100));

    scheduler.stop().await;
}
