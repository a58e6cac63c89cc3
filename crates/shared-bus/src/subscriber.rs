//! # Bus Subscriber
//!
//! The subscription side of the settlement bus.

use crate::message::BusMessage;
use crate::subject::subject_matches;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::warn;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("Settlement bus closed")]
    Closed,
}

/// A subscription handle for receiving bus messages.
///
/// Retained messages replay first; live messages follow. If the live
/// channel lags, the skipped range is logged — consumers recover state
/// from retained replay on resubscribe, and the coordinator republishes
/// active state after a disconnect.
pub struct Subscription {
    receiver: broadcast::Receiver<BusMessage>,
    pattern: String,
    replay: VecDeque<BusMessage>,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusMessage>,
        pattern: String,
        replay: Vec<BusMessage>,
    ) -> Self {
        Self {
            receiver,
            pattern,
            replay: replay.into(),
        }
    }

    /// Receive the next matching message.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - the next replayed or live message
    /// - `None` - the bus was dropped
    pub async fn recv(&mut self) -> Option<BusMessage> {
        if let Some(replayed) = self.replay.pop_front() {
            return Some(replayed);
        }
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        pattern = %self.pattern,
                        lagged = count,
                        "bus subscriber lagged, live messages skipped"
                    );
                    continue;
                }
            };

            if subject_matches(&self.pattern, &message.subject) {
                return Some(message);
            }
        }
    }

    /// Try to receive the next matching message without blocking.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::Closed` when the bus was dropped.
    pub fn try_recv(&mut self) -> Result<Option<BusMessage>, SubscriptionError> {
        if let Some(replayed) = self.replay.pop_front() {
            return Ok(Some(replayed));
        }
        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if subject_matches(&self.pattern, &message.subject) {
                return Ok(Some(message));
            }
        }
    }

    /// The pattern this subscription filters on.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// A stream wrapper for subscriptions, for use with stream combinators.
pub struct BusStream {
    subscription: Subscription,
}

impl BusStream {
    /// Wrap a subscription.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }
}

impl Stream for BusStream {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.subscription.try_recv() {
            Ok(Some(message)) => Poll::Ready(Some(message)),
            Ok(None) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(SubscriptionError::Closed) => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{BusPublisher, SettlementBus};
    use shared_types::{
        Hash160, HtlcParams, OrderId, ProposalId, SecretReveal, SettlementPayload, SwapSecret,
    };
    use std::time::Duration;
    use tokio::time::timeout;

    fn secret_payload() -> SettlementPayload {
        SettlementPayload::Secret(SecretReveal {
            proposal_id: ProposalId::derive(&OrderId::from_nanos(3), 1),
            secret: SwapSecret::new([1u8; 32]),
        })
    }

    #[tokio::test]
    async fn test_recv_live() {
        let bus = SettlementBus::new();
        let mut sub = bus.subscribe("settlement.secret.*");

        bus.publish(secret_payload(), 5).await;

        let msg = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");
        assert!(matches!(msg.payload, SettlementPayload::Secret(_)));
    }

    #[tokio::test]
    async fn test_recv_filters_subjects() {
        let bus = SettlementBus::new();
        let mut sub = bus.subscribe("settlement.secret.*");

        bus.publish(
            SettlementPayload::Htlc(HtlcParams {
                proposal_id: ProposalId::derive(&OrderId::from_nanos(1), 1),
                hash_lock: Hash160::default(),
                base_locktime: 2,
                quote_locktime: 1,
            }),
            5,
        )
        .await;
        bus.publish(secret_payload(), 6).await;

        let msg = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");
        assert!(matches!(msg.payload, SettlementPayload::Secret(_)));
    }

    #[tokio::test]
    async fn test_recv_none_after_bus_drop() {
        let bus = SettlementBus::new();
        let mut sub = bus.subscribe("settlement.secret.*");
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_then_closed() {
        let bus = SettlementBus::new();
        bus.publish(secret_payload(), 5).await;

        let mut sub = bus.subscribe("settlement.secret.*");
        drop(bus);

        // Retained replay still delivers even though the bus is gone.
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = SettlementBus::new();
        let mut sub = bus.subscribe("settlement.secret.*");
        assert!(matches!(sub.try_recv(), Ok(None)));
    }
}
