//! # Bus Publisher
//!
//! The publishing side of the settlement bus.

use crate::message::BusMessage;
use crate::subject::subject_matches;
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::SettlementPayload;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Trait for publishing settlement records to the bus.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish a payload on its derived subject at `now`.
    ///
    /// # Returns
    ///
    /// The number of live subscribers the message was fanned out to. Zero
    /// is not an error: retained state still serves late subscribers.
    async fn publish(&self, payload: SettlementPayload, now: u64) -> usize;

    /// Total messages published.
    fn messages_published(&self) -> u64;
}

/// In-memory settlement bus.
///
/// `tokio::sync::broadcast` provides the live fan-out (per-publisher FIFO);
/// a retained last-record-per-subject map provides state recovery for
/// subscribers that attach late or re-attach after a disconnect. Suitable
/// for single-process operation; a distributed deployment would put a
/// messaging server behind the same traits.
pub struct SettlementBus {
    /// Live fan-out channel.
    sender: broadcast::Sender<BusMessage>,

    /// Last record per subject, replayed to new subscribers.
    retained: Arc<RwLock<HashMap<String, BusMessage>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl SettlementBus {
    /// Create a bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given live-channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            retained: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to subjects matching `pattern`.
    ///
    /// Retained records for matching subjects are replayed first, oldest
    /// publish time first, then live messages follow.
    #[must_use]
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        let receiver = self.sender.subscribe();

        let mut replay: Vec<BusMessage> = self
            .retained
            .read()
            .values()
            .filter(|m| subject_matches(pattern, &m.subject))
            .cloned()
            .collect();
        replay.sort_by_key(|m| m.published_at);

        debug!(pattern, replayed = replay.len(), "bus subscription created");
        Subscription::new(receiver, pattern.to_string(), replay)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The live-channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The retained record for a subject, if any.
    #[must_use]
    pub fn retained(&self, subject: &str) -> Option<BusMessage> {
        self.retained.read().get(subject).cloned()
    }
}

impl Default for SettlementBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusPublisher for SettlementBus {
    async fn publish(&self, payload: SettlementPayload, now: u64) -> usize {
        let message = BusMessage::new(payload, now);
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        self.retained
            .write()
            .insert(message.subject.clone(), message.clone());

        let subject = message.subject.clone();
        match self.sender.send(message) {
            Ok(receiver_count) => {
                debug!(subject, receivers = receiver_count, "bus message published");
                receiver_count
            }
            Err(_) => {
                // No live receivers; the retained record still serves
                // whoever subscribes next.
                debug!(subject, "bus message retained (no live receivers)");
                0
            }
        }
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Hash160, HtlcParams, OrderId, ProposalId, SettlementStatus, StatusUpdate, SwapParty};

    fn htlc_payload(nanos: u128) -> SettlementPayload {
        SettlementPayload::Htlc(HtlcParams {
            proposal_id: ProposalId::derive(&OrderId::from_nanos(nanos), 1),
            hash_lock: Hash160::default(),
            base_locktime: 2,
            quote_locktime: 1,
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_retained() {
        let bus = SettlementBus::new();
        let payload = htlc_payload(1);
        let subject = payload.subject();

        let receivers = bus.publish(payload, 10).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.messages_published(), 1);
        assert!(bus.retained(&subject).is_some());
    }

    #[tokio::test]
    async fn test_live_delivery() {
        let bus = SettlementBus::new();
        let mut sub = bus.subscribe("settlement.htlc.*");

        let receivers = bus.publish(htlc_payload(1), 10).await;
        assert_eq!(receivers, 1);

        let msg = sub.recv().await.expect("message");
        assert!(msg.subject.starts_with("settlement.htlc."));
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_retained() {
        let bus = SettlementBus::new();
        bus.publish(htlc_payload(1), 10).await;
        bus.publish(htlc_payload(2), 20).await;

        let mut sub = bus.subscribe("settlement.htlc.*");
        let first = sub.recv().await.expect("replayed");
        let second = sub.recv().await.expect("replayed");
        // Replay comes oldest first.
        assert_eq!(first.published_at, 10);
        assert_eq!(second.published_at, 20);
    }

    #[tokio::test]
    async fn test_retained_keeps_only_last_per_subject() {
        let bus = SettlementBus::new();
        let proposal = ProposalId::derive(&OrderId::from_nanos(1), 1);
        for target in [SettlementStatus::MakerLocked, SettlementStatus::BothLocked] {
            bus.publish(
                SettlementPayload::Status(StatusUpdate {
                    proposal_id: proposal.clone(),
                    target,
                    party: SwapParty::Maker,
                    tx_id: None,
                    escrow_address: None,
                    pubkey_hash: None,
                    funding_address: None,
                }),
                0,
            )
            .await;
        }

        let mut sub = bus.subscribe("settlement.status.*");
        let msg = sub.recv().await.expect("replayed");
        match msg.payload {
            SettlementPayload::Status(update) => {
                assert_eq!(update.target, SettlementStatus::BothLocked);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pattern_filters_live_traffic() {
        let bus = SettlementBus::new();
        let mut sub = bus.subscribe("settlement.secret.*");

        bus.publish(htlc_payload(1), 10).await;
        assert!(matches!(sub.try_recv(), Ok(None)));
    }
}
