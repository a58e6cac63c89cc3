//! Outbound port to the transport.
//!
//! The engine speaks to the network through this narrow trait so tests
//! can wire engines together without sockets.

use async_trait::async_trait;
use bt_01_peer_network::{NetworkError, NetworkHandle};
use shared_crypto::SignedEnvelope;
use shared_types::PeerTag;

/// Outbound transport operations the engine needs.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Best-effort broadcast to all reachable peers.
    async fn broadcast(&self, envelope: SignedEnvelope) -> Result<(), NetworkError>;

    /// Short-lived direct stream to one peer.
    async fn send_direct(
        &self,
        peer: PeerTag,
        envelopes: Vec<SignedEnvelope>,
    ) -> Result<(), NetworkError>;
}

#[async_trait]
impl Outbound for NetworkHandle {
    async fn broadcast(&self, envelope: SignedEnvelope) -> Result<(), NetworkError> {
        NetworkHandle::broadcast(self, envelope).await
    }

    async fn send_direct(
        &self,
        peer: PeerTag,
        envelopes: Vec<SignedEnvelope>,
    ) -> Result<(), NetworkError> {
        NetworkHandle::send_direct(self, peer, envelopes).await
    }
}
