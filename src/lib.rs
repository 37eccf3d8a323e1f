//! ChatRelay - concurrency substrate for chat-bot backends.
//!
//! This library provides the resource-management core a chat-bot backend
//! needs to stay responsive and within third-party rate limits under many
//! simultaneous users: a priority message scheduler with smart batch
//! merging, a multi-tier result cache, and a multi-key API quota and
//! load-balancing manager.
//!
//! The three subsystems are independent and composed by the caller: look up
//! the cache before doing expensive work, ask the quota manager for an API
//! key before calling a rate-limited service, and deliver the resulting
//! notifications through the scheduler.
//!
//! # High-Level API
//!
//! ```ignore
//! use chatrelay::scheduler::{MessageScheduler, SchedulerConfig, MessagePriority};
//!
//! let scheduler = MessageScheduler::new(SchedulerConfig::default(), transport);
//! scheduler.start().await;
//!
//! scheduler
//!     .enqueue("chat-42", "3 cards processed", MessagePriority::Normal)
//!     .await;
//! ```

pub mod cache;
pub mod logging;
pub mod quota;
pub mod scheduler;

/// Version of the ChatRelay library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_not_empty() {
        assert!(!VERSION.is_empty(), "Version should not be empty");
    }
}
