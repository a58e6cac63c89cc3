//! # Bus Message
//!
//! The delivery wrapper around a settlement payload: a unique message id
//! for duplicate suppression, the routing subject, and the publish time.

use serde::{Deserialize, Serialize};
use shared_types::SettlementPayload;
use uuid::Uuid;

/// A message in flight on the settlement bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusMessage {
    /// Unique id of this delivery, for consumer-side deduplication.
    pub message_id: Uuid,
    /// Routing subject, derived from the payload.
    pub subject: String,
    /// The settlement record.
    pub payload: SettlementPayload,
    /// Publish time, unix seconds.
    pub published_at: u64,
}

impl BusMessage {
    /// Wrap a payload for publication at `now`.
    #[must_use]
    pub fn new(payload: SettlementPayload, now: u64) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            subject: payload.subject(),
            payload,
            published_at: now,
        }
    }
}
