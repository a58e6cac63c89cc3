//! Test wiring: an in-process loopback transport.
//!
//! Routes envelopes between engines through their network-event channels,
//! so multi-peer negotiation flows run without sockets. Used by this
//! crate's tests and the unified integration suite.

use crate::ports::Outbound;
use async_trait::async_trait;
use bt_01_peer_network::{Delivery, NetworkError, NetworkEvent};
use parking_lot::Mutex;
use shared_crypto::SignedEnvelope;
use shared_types::PeerTag;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Shared router between loopback endpoints.
#[derive(Default)]
pub struct LoopbackRouter {
    inboxes: Mutex<HashMap<PeerTag, mpsc::Sender<NetworkEvent>>>,
}

impl LoopbackRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a peer, returning its outbound endpoint and inbound events.
    pub fn attach(
        self: &Arc<Self>,
        peer: PeerTag,
    ) -> (Arc<LoopbackNet>, mpsc::Receiver<NetworkEvent>) {
        let (tx, rx) = mpsc::channel(256);
        self.inboxes.lock().insert(peer.clone(), tx);
        (
            Arc::new(LoopbackNet {
                local: peer,
                router: self.clone(),
            }),
            rx,
        )
    }
}

/// One peer's endpoint on the loopback router.
pub struct LoopbackNet {
    local: PeerTag,
    router: Arc<LoopbackRouter>,
}

#[async_trait]
impl Outbound for LoopbackNet {
    async fn broadcast(&self, envelope: SignedEnvelope) -> Result<(), NetworkError> {
        let targets: Vec<_> = self
            .router
            .inboxes
            .lock()
            .iter()
            .filter(|(peer, _)| **peer != self.local)
            .map(|(_, tx)| tx.clone())
            .collect();
        for tx in targets {
            let _ = tx
                .send(NetworkEvent::Envelope {
                    from: self.local.clone(),
                    envelope: envelope.clone(),
                    delivery: Delivery::Broadcast,
                })
                .await;
        }
        Ok(())
    }

    async fn send_direct(
        &self,
        peer: PeerTag,
        envelopes: Vec<SignedEnvelope>,
    ) -> Result<(), NetworkError> {
        let tx = self
            .router
            .inboxes
            .lock()
            .get(&peer)
            .cloned()
            .ok_or_else(|| NetworkError::DirectSendFailed(format!("unknown peer {peer}")))?;
        for envelope in envelopes {
            tx.send(NetworkEvent::Envelope {
                from: self.local.clone(),
                envelope,
                delivery: Delivery::Direct,
            })
            .await
            .map_err(|_| NetworkError::DirectSendFailed("peer inbox closed".into()))?;
        }
        Ok(())
    }
}
