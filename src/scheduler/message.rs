//! Message types for the priority scheduler.
//!
//! A [`QueuedMessage`] is an immutable record: retries never mutate an
//! existing message in place, they produce a new record via
//! [`QueuedMessage::retry_successor`]. This keeps two code paths from ever
//! holding the same mutable message.

use sha2::{Digest, Sha256};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Message urgency levels, most urgent first.
///
/// Lower discriminant means more urgent. `Emergency` bypasses the queues
/// entirely; `Batch` messages are buffered and merged before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessagePriority {
    /// Sent immediately, bypassing all queues.
    Emergency = 1,
    /// Processed before everything except emergencies.
    High = 2,
    /// Standard processing.
    Normal = 3,
    /// Deferred processing.
    Low = 4,
    /// Buffered and merged with other batch messages for the same key.
    Batch = 5,
}

impl MessagePriority {
    /// All priority levels in dispatch order (most to least urgent).
    pub const ALL: [MessagePriority; 5] = [
        MessagePriority::Emergency,
        MessagePriority::High,
        MessagePriority::Normal,
        MessagePriority::Low,
        MessagePriority::Batch,
    ];

    /// Returns the next-less-urgent level, saturating at `Low`.
    ///
    /// Used for retry demotion: retried messages progressively de-prioritize
    /// but never fall into the batch-merge level.
    pub fn demoted(self) -> MessagePriority {
        match self {
            MessagePriority::Emergency => MessagePriority::High,
            MessagePriority::High => MessagePriority::Normal,
            MessagePriority::Normal => MessagePriority::Low,
            MessagePriority::Low | MessagePriority::Batch => MessagePriority::Low,
        }
    }

    /// Human-readable name for logging.
    pub fn name(self) -> &'static str {
        match self {
            MessagePriority::Emergency => "emergency",
            MessagePriority::High => "high",
            MessagePriority::Normal => "normal",
            MessagePriority::Low => "low",
            MessagePriority::Batch => "batch",
        }
    }
}

/// An outbound message owned by the scheduler.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Destination identifier (chat id, user id - opaque to the scheduler).
    pub target: String,
    /// Text payload.
    pub text: String,
    /// Urgency level.
    pub priority: MessagePriority,
    /// Creation time for latency accounting and merge summaries.
    pub created_at: Instant,
    /// Wall-clock creation time, feeds the content-derived id.
    pub created_unix_nanos: u128,
    /// Number of delivery attempts already made.
    pub retry_count: u32,
    /// Maximum delivery attempts before the message is dropped.
    pub max_retries: u32,
    /// Optional transport formatting hint (e.g. "Markdown"), passed through.
    pub parse_mode: Option<String>,
    /// Optional batch context (groups mergeable messages).
    pub context: Option<String>,
    /// Optional message type (selects the merge strategy).
    pub message_type: Option<String>,
    /// Content-derived message id.
    pub message_id: String,
}

impl QueuedMessage {
    /// Creates a new message with a content-derived id.
    pub fn new(
        target: impl Into<String>,
        text: impl Into<String>,
        priority: MessagePriority,
    ) -> Self {
        Self::with_options(target, text, priority, MessageOptions::default())
    }

    /// Creates a new message with the full option set.
    pub fn with_options(
        target: impl Into<String>,
        text: impl Into<String>,
        priority: MessagePriority,
        options: MessageOptions,
    ) -> Self {
        let target = target.into();
        let text = text.into();
        let created_unix_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let message_id = derive_message_id(&target, &text, created_unix_nanos);

        Self {
            target,
            text,
            priority,
            created_at: Instant::now(),
            created_unix_nanos,
            retry_count: 0,
            max_retries: options.max_retries,
            parse_mode: options.parse_mode,
            context: options.context,
            message_type: options.message_type,
            message_id,
        }
    }

    /// Batch-merge key: `target:message_type:context`.
    ///
    /// Only meaningful for `Batch` priority messages; components that are
    /// absent are simply omitted.
    pub fn batch_key(&self) -> String {
        let mut parts = vec![self.target.clone()];
        if let Some(ty) = &self.message_type {
            parts.push(ty.clone());
        }
        if let Some(ctx) = &self.context {
            parts.push(ctx.clone());
        }
        parts.join(":")
    }

    /// Returns true if another delivery attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Produces the retry successor: a new record with the attempt counter
    /// incremented and the priority demoted one level.
    ///
    /// The original record stays untouched; callers drop it after this.
    pub fn retry_successor(&self) -> QueuedMessage {
        let mut next = self.clone();
        next.retry_count += 1;
        next.priority = self.priority.demoted();
        next
    }
}

/// Optional parameters for [`QueuedMessage::with_options`].
#[derive(Debug, Clone)]
pub struct MessageOptions {
    /// Maximum delivery attempts (default: 3).
    pub max_retries: u32,
    /// Transport formatting hint.
    pub parse_mode: Option<String>,
    /// Batch context.
    pub context: Option<String>,
    /// Message type.
    pub message_type: Option<String>,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            parse_mode: None,
            context: None,
            message_type: None,
        }
    }
}

/// Derives a short content-addressed message id.
///
/// First 12 hex characters of `sha256(target:text:created_nanos)` - enough
/// to correlate log lines without carrying the full digest around.
fn derive_message_id(target: &str, text: &str, created_unix_nanos: u128) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    hasher.update(b":");
    hasher.update(text.as_bytes());
    hasher.update(b":");
    hasher.update(created_unix_nanos.to_string().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..6])
}
