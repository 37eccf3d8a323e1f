//! Transport seam between the scheduler and the chat platform.
//!
//! The scheduler has zero compile-time knowledge of Telegram, LINE, or any
//! other platform. The host injects a [`Transport`] implementation; the
//! scheduler only cares whether a send succeeded, failed transiently (worth
//! retrying), or failed permanently (drop immediately).

use std::future::Future;
use std::pin::Pin;

/// Options forwarded to the transport alongside the payload.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Formatting hint (e.g. "Markdown", "HTML"). Transport-defined.
    pub parse_mode: Option<String>,
}

/// Error returned by a transport send.
///
/// Retryability is part of the error, the way the scheduler needs it:
/// transient errors (network, rate limit) are retried with backoff,
/// permanent errors (malformed payload, forbidden target) are not.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SendError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is worth retrying.
    pub is_retryable: bool,
}

impl SendError {
    /// Creates a retryable error (transient failure like a network timeout).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }

    /// Creates a permanent error (won't succeed on retry).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }
}

/// Caller-supplied message transport.
///
/// Implementations perform the actual platform send. The trait is dyn-safe
/// so the scheduler can hold `Arc<dyn Transport>`.
///
/// # Example
///
/// ```ignore
/// struct TelegramTransport { client: TelegramClient }
///
/// impl Transport for TelegramTransport {
///     fn send<'a>(
///         &'a self,
///         target: &'a str,
///         text: &'a str,
///         options: &'a SendOptions,
///     ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>> {
///         Box::pin(async move {
///             self.client
///                 .send_message(target, text, options.parse_mode.as_deref())
///                 .await
///                 .map_err(|e| SendError::transient(e.to_string()))
///         })
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Sends one message to the target.
    fn send<'a>(
        &'a self,
        target: &'a str,
        text: &'a str,
        options: &'a SendOptions,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>>;
}
