//! # Shared Bus - Settlement Messaging
//!
//! Topic-based pub/sub substrate between the node-side subsystems and the
//! settlement coordinator.
//!
//! ## Subjects
//!
//! Every message carries a subject of the form
//! `settlement.<family>.<proposal_id>`; subscribers filter with patterns
//! where `*` matches exactly one token (`settlement.status.*`).
//!
//! ## Delivery semantics
//!
//! - Per-subject FIFO from a single publisher; no cross-subject order.
//! - At-least-once: the bus retains the last record per subject and
//!   replays retained state to new (and re-attaching) subscribers, so a
//!   consumer that missed live traffic converges. Handlers are expected
//!   to be idempotent on `(proposal_id, transition_target)`.
//! - Duplicate suppression, where a consumer wants it, goes through the
//!   time-bounded [`SeenCache`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod message;
pub mod publisher;
pub mod seen_cache;
pub mod subject;
pub mod subscriber;

// Re-export main types
pub use message::BusMessage;
pub use publisher::{BusPublisher, SettlementBus};
pub use seen_cache::SeenCache;
pub use subject::subject_matches;
pub use subscriber::{BusStream, Subscription, SubscriptionError};

/// Maximum messages to buffer per subscriber before backpressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1024);
    }
}
