//! Batch buffering and smart message merging.
//!
//! `Batch`-priority messages are not queued directly: they accumulate in a
//! per-key buffer (`target:message_type:context`) and flush as one merged
//! `High`-priority message when either the buffer reaches `batch_size` or a
//! per-key timer fires, whichever happens first.
//!
//! Merge strategy is type-aware:
//! - `"card_processing_complete"`: digest listing up to 5 entries plus an
//!   overflow count and elapsed time
//! - `"batch_progress"`: only the newest progress message survives
//! - anything else: plain concatenation for small batches, a capped summary
//!   with an elision marker for larger ones

use crate::scheduler::message::{MessageOptions, MessagePriority, QueuedMessage};
use std::collections::HashMap;
use std::sync::Mutex;

/// Maximum entries listed in a completion digest before eliding.
const DIGEST_MAX_ENTRIES: usize = 5;

/// Batches up to this size are merged by straight concatenation.
const CONCAT_MAX_MESSAGES: usize = 3;

/// Character cap per bullet in a fallback summary.
const SUMMARY_SNIPPET_LEN: usize = 50;

/// Accumulates batch messages per merge key until flush.
///
/// Timer arming and the actual re-enqueue of the merged message are the
/// scheduler's job; this type only owns the buffers.
pub struct BatchBuffers {
    pending: Mutex<HashMap<String, Vec<QueuedMessage>>>,
    batch_size: usize,
}

/// Result of inserting a message into the buffers.
#[derive(Debug)]
pub enum BatchInsert {
    /// First message for this key; the caller should arm a flush timer.
    Armed,
    /// Message buffered behind existing ones; nothing to do yet.
    Buffered,
    /// Buffer reached `batch_size`; the drained batch must be merged and
    /// re-enqueued now. The flush timer for this key should be cancelled.
    Full(Vec<QueuedMessage>),
}

impl BatchBuffers {
    /// Creates empty buffers flushing at `batch_size` messages.
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Adds a message to its key's buffer.
    pub fn insert(&self, message: QueuedMessage) -> BatchInsert {
        let key = message.batch_key();
        let mut pending = self.pending.lock().unwrap();
        let buffer = pending.entry(key.clone()).or_default();
        let was_empty = buffer.is_empty();
        buffer.push(message);

        if buffer.len() >= self.batch_size {
            let drained = pending.remove(&key).unwrap_or_default();
            BatchInsert::Full(drained)
        } else if was_empty {
            BatchInsert::Armed
        } else {
            BatchInsert::Buffered
        }
    }

    /// Removes and returns the buffer for `key`, if any.
    ///
    /// Called by the flush timer when it fires.
    pub fn take(&self, key: &str) -> Option<Vec<QueuedMessage>> {
        let mut pending = self.pending.lock().unwrap();
        pending.remove(key).filter(|msgs| !msgs.is_empty())
    }

    /// Drains every buffer. Used on shutdown so no batched message is
    /// silently lost.
    pub fn drain_all(&self) -> Vec<(String, Vec<QueuedMessage>)> {
        let mut pending = self.pending.lock().unwrap();
        pending.drain().filter(|(_, v)| !v.is_empty()).collect()
    }

    /// Number of keys with buffered messages.
    pub fn pending_keys(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// Merges a drained batch into a single message.
///
/// Returns `None` for an empty input. A single-message batch passes through
/// unchanged apart from the priority bump to `High`.
pub fn merge_messages(mut messages: Vec<QueuedMessage>) -> Option<QueuedMessage> {
    if messages.is_empty() {
        return None;
    }
    if messages.len() == 1 {
        let mut only = messages.pop().unwrap();
        only.priority = MessagePriority::High;
        return Some(only);
    }

    match messages[0].message_type.as_deref() {
        Some("card_processing_complete") => Some(merge_completion_digest(&messages)),
        Some("batch_progress") => {
            // Progress messages supersede each other; keep only the newest
            let mut newest = messages
                .into_iter()
                .max_by_key(|m| m.created_unix_nanos)
                .unwrap();
            newest.priority = MessagePriority::High;
            Some(newest)
        }
        _ => Some(merge_default(&messages)),
    }
}

/// Digest merge for completion notifications.
///
/// "N items completed" with up to [`DIGEST_MAX_ENTRIES`] entries listed,
/// an overflow count, and the elapsed time since the oldest message.
fn merge_completion_digest(messages: &[QueuedMessage]) -> QueuedMessage {
    let base = &messages[0];
    let count = messages.len();

    let entries: Vec<&str> = messages
        .iter()
        .map(|m| m.text.lines().next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .collect();

    let mut text = format!("Batch complete: {} items processed\n", count);
    for (i, entry) in entries.iter().take(DIGEST_MAX_ENTRIES).enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, entry));
    }
    if entries.len() > DIGEST_MAX_ENTRIES {
        text.push_str(&format!(
            "...and {} more\n",
            entries.len() - DIGEST_MAX_ENTRIES
        ));
    }
    text.push_str(&format!(
        "Elapsed: {:.1}s",
        base.created_at.elapsed().as_secs_f64()
    ));

    merged_from(base, text, "batch_summary")
}

/// Fallback merge for unknown message types.
fn merge_default(messages: &[QueuedMessage]) -> QueuedMessage {
    let base = &messages[0];

    let text = if messages.len() <= CONCAT_MAX_MESSAGES {
        messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        let mut summary = format!("Batch summary ({} messages)\n", messages.len());
        for m in messages.iter().take(CONCAT_MAX_MESSAGES) {
            let snippet: String = m.text.chars().take(SUMMARY_SNIPPET_LEN).collect();
            summary.push_str(&format!("- {}\n", snippet));
        }
        summary.push_str(&format!(
            "...and {} more",
            messages.len() - CONCAT_MAX_MESSAGES
        ));
        summary
    };

    merged_from(base, text, "merged_batch")
}

fn merged_from(base: &QueuedMessage, text: String, message_type: &str) -> QueuedMessage {
    QueuedMessage::with_options(
        base.target.clone(),
        text,
        MessagePriority::High,
        MessageOptions {
            parse_mode: base.parse_mode.clone(),
            context: base.context.clone(),
            message_type: Some(message_type.to_string()),
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_msg(text: &str, message_type: Option<&str>) -> QueuedMessage {
        QueuedMessage::with_options(
            "chat-1",
            text,
            MessagePriority::Batch,
            MessageOptions {
                message_type: message_type.map(String::from),
                context: Some("ctx".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_first_insert_arms_timer() {
        let buffers = BatchBuffers::new(3);
        match buffers.insert(batch_msg("a", None)) {
            BatchInsert::Armed => {}
            other => panic!("expected Armed, got {:?}", other),
        }
        assert_eq!(buffers.pending_keys(), 1);
    }

    #[test]
    fn test_reaching_batch_size_drains() {
        let buffers = BatchBuffers::new(3);
        buffers.insert(batch_msg("a", None));
        buffers.insert(batch_msg("b", None));
        match buffers.insert(batch_msg("c", None)) {
            BatchInsert::Full(drained) => assert_eq!(drained.len(), 3),
            other => panic!("expected Full, got {:?}", other),
        }
        // Buffer removed, next insert re-arms
        assert_eq!(buffers.pending_keys(), 0);
        match buffers.insert(batch_msg("d", None)) {
            BatchInsert::Armed => {}
            other => panic!("expected Armed, got {:?}", other),
        }
    }

    #[test]
    fn test_take_empties_buffer() {
        let buffers = BatchBuffers::new(10);
        let msg = batch_msg("a", None);
        let key = msg.batch_key();
        buffers.insert(msg);

        let taken = buffers.take(&key).expect("buffer should exist");
        assert_eq!(taken.len(), 1);
        assert!(buffers.take(&key).is_none());
    }

    #[test]
    fn test_drain_all_returns_everything() {
        let buffers = BatchBuffers::new(10);
        buffers.insert(batch_msg("a", Some("t1")));
        buffers.insert(batch_msg("b", Some("t1")));
        buffers.insert(batch_msg("c", Some("t2")));

        let drained = buffers.drain_all();
        let total: usize = drained.iter().map(|(_, v)| v.len()).sum();
        assert_eq!(total, 3);
        assert_eq!(buffers.pending_keys(), 0);
    }

    #[test]
    fn test_merge_empty_is_none() {
        assert!(merge_messages(vec![]).is_none());
    }

    #[test]
    fn test_merge_single_passes_through_at_high() {
        let merged = merge_messages(vec![batch_msg("only one", None)]).unwrap();
        assert_eq!(merged.text, "only one");
        assert_eq!(merged.priority, MessagePriority::High);
    }

    #[test]
    fn test_completion_digest_counts_all_inputs() {
        let messages: Vec<_> = (0..7)
            .map(|i| batch_msg(&format!("Card {}", i), Some("card_processing_complete")))
            .collect();
        let merged = merge_messages(messages).unwrap();

        assert!(merged.text.contains("7 items processed"));
        // Five listed, two elided
        assert!(merged.text.contains("5. Card 4"));
        assert!(merged.text.contains("...and 2 more"));
        assert_eq!(merged.priority, MessagePriority::High);
        assert_eq!(merged.message_type.as_deref(), Some("batch_summary"));
    }

    #[test]
    fn test_completion_digest_lists_first_lines() {
        let messages = vec![
            batch_msg("Alice Chen\nCEO, Acme", Some("card_processing_complete")),
            batch_msg("Bob Wu\nCTO, Initech", Some("card_processing_complete")),
        ];
        let merged = merge_messages(messages).unwrap();
        assert!(merged.text.contains("1. Alice Chen"));
        assert!(merged.text.contains("2. Bob Wu"));
        assert!(!merged.text.contains("...and"));
    }

    #[test]
    fn test_progress_merge_keeps_newest() {
        let older = batch_msg("3/10 done", Some("batch_progress"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = batch_msg("7/10 done", Some("batch_progress"));

        let merged = merge_messages(vec![older, newer]).unwrap();
        assert_eq!(merged.text, "7/10 done");
        assert_eq!(merged.priority, MessagePriority::High);
    }

    #[test]
    fn test_default_merge_concatenates_small_batches() {
        let merged = merge_messages(vec![batch_msg("one", None), batch_msg("two", None)]).unwrap();
        assert_eq!(merged.text, "one\n\ntwo");
        assert_eq!(merged.message_type.as_deref(), Some("merged_batch"));
    }

    #[test]
    fn test_default_merge_summarizes_large_batches() {
        let messages: Vec<_> = (0..6).map(|i| batch_msg(&format!("msg {}", i), None)).collect();
        let merged = merge_messages(messages).unwrap();

        assert!(merged.text.contains("Batch summary (6 messages)"));
        assert!(merged.text.contains("...and 3 more"));
    }

    #[test]
    fn test_separate_keys_buffer_independently() {
        let buffers = BatchBuffers::new(2);
        buffers.insert(batch_msg("a", Some("t1")));
        buffers.insert(batch_msg("b", Some("t2")));
        assert_eq!(buffers.pending_keys(), 2);

        // Each key needs its own second message to flush
        match buffers.insert(batch_msg("c", Some("t1"))) {
            BatchInsert::Full(drained) => assert_eq!(drained.len(), 2),
            other => panic!("expected Full, got {:?}", other),
        }
        assert_eq!(buffers.pending_keys(), 1);
    }
}
