//! Per-priority FIFO queues with drop-newest back-pressure.
//!
//! One bounded FIFO per urgency level, drained strictly in level order.
//! When a queue is at capacity the incoming message is dropped and logged -
//! enqueue never blocks the caller.

use crate::scheduler::message::{MessagePriority, QueuedMessage};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

/// Result of a push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Message accepted.
    Queued,
    /// Queue at capacity; message dropped (drop-newest policy).
    Dropped,
}

/// The scheduler's priority queues.
///
/// Within one level, FIFO; across levels, strict priority. Sustained high
/// traffic can starve lower levels - accepted policy, not a defect.
pub struct PriorityQueues {
    queues: [Mutex<VecDeque<QueuedMessage>>; 5],
    max_queue_size: usize,
}

impl PriorityQueues {
    /// Creates empty queues, each bounded to `max_queue_size` messages.
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            queues: [
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
            ],
            max_queue_size,
        }
    }

    fn slot(&self, priority: MessagePriority) -> &Mutex<VecDeque<QueuedMessage>> {
        &self.queues[priority as usize - 1]
    }

    /// Pushes a message onto its priority queue.
    ///
    /// Drops the message (with a warn log) when the queue is full.
    pub fn push(&self, message: QueuedMessage) -> PushOutcome {
        let mut queue = self.slot(message.priority).lock().unwrap();
        if queue.len() >= self.max_queue_size {
            warn!(
                message_id = %message.message_id,
                priority = message.priority.name(),
                "Queue full, dropping message"
            );
            return PushOutcome::Dropped;
        }
        queue.push_back(message);
        PushOutcome::Queued
    }

    /// Pops the most urgent available message.
    ///
    /// Scans levels from most to least urgent; no round robin.
    pub fn pop_next(&self) -> Option<QueuedMessage> {
        for priority in MessagePriority::ALL {
            let mut queue = self.slot(priority).lock().unwrap();
            if let Some(message) = queue.pop_front() {
                return Some(message);
            }
        }
        None
    }

    /// Number of messages waiting at the given level.
    pub fn len_at(&self, priority: MessagePriority) -> usize {
        self.slot(priority).lock().unwrap().len()
    }

    /// Total messages waiting across all levels.
    pub fn total_len(&self) -> usize {
        MessagePriority::ALL
            .iter()
            .map(|p| self.len_at(*p))
            .sum()
    }

    /// Maximum messages per level.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, priority: MessagePriority) -> QueuedMessage {
        QueuedMessage::new("chat-1", text, priority)
    }

    #[test]
    fn test_push_and_pop_fifo_within_level() {
        let queues = PriorityQueues::new(10);
        queues.push(msg("first", MessagePriority::Normal));
        queues.push(msg("second", MessagePriority::Normal));

        assert_eq!(queues.pop_next().unwrap().text, "first");
        assert_eq!(queues.pop_next().unwrap().text, "second");
        assert!(queues.pop_next().is_none());
    }

    #[test]
    fn test_pop_respects_priority_order() {
        let queues = PriorityQueues::new(10);
        queues.push(msg("low", MessagePriority::Low));
        queues.push(msg("high", MessagePriority::High));
        queues.push(msg("normal", MessagePriority::Normal));

        assert_eq!(queues.pop_next().unwrap().text, "high");
        assert_eq!(queues.pop_next().unwrap().text, "normal");
        assert_eq!(queues.pop_next().unwrap().text, "low");
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let queues = PriorityQueues::new(2);
        assert_eq!(
            queues.push(msg("a", MessagePriority::Normal)),
            PushOutcome::Queued
        );
        assert_eq!(
            queues.push(msg("b", MessagePriority::Normal)),
            PushOutcome::Queued
        );
        assert_eq!(
            queues.push(msg("c", MessagePriority::Normal)),
            PushOutcome::Dropped
        );

        // Existing messages survive; the newest was dropped
        assert_eq!(queues.pop_next().unwrap().text, "a");
        assert_eq!(queues.pop_next().unwrap().text, "b");
        assert!(queues.pop_next().is_none());
    }

    #[test]
    fn test_capacity_is_per_level() {
        let queues = PriorityQueues::new(1);
        assert_eq!(
            queues.push(msg("a", MessagePriority::Normal)),
            PushOutcome::Queued
        );
        // A different level has its own capacity
        assert_eq!(
            queues.push(msg("b", MessagePriority::High)),
            PushOutcome::Queued
        );
        assert_eq!(queues.total_len(), 2);
    }

    #[test]
    fn test_len_tracking() {
        let queues = PriorityQueues::new(10);
        assert_eq!(queues.total_len(), 0);
        queues.push(msg("a", MessagePriority::High));
        queues.push(msg("b", MessagePriority::Low));
        assert_eq!(queues.len_at(MessagePriority::High), 1);
        assert_eq!(queues.len_at(MessagePriority::Low), 1);
        assert_eq!(queues.total_len(), 2);
        queues.pop_next();
        assert_eq!(queues.total_len(), 1);
    }
}
