//! Transport errors.

use shared_types::ErrorKind;
use thiserror::Error;

/// Errors surfaced by the peer network.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The peer tag does not parse as a transport peer id.
    #[error("Invalid peer id: {0}")]
    InvalidPeerId(String),

    /// The address does not parse as a multiaddr.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Dialing the address failed.
    #[error("Dial failed: {0}")]
    DialFailed(String),

    /// The direct stream failed before the ack arrived.
    #[error("Direct send failed: {0}")]
    DirectSendFailed(String),

    /// Gossip publish was rejected locally.
    #[error("Broadcast publish failed: {0}")]
    PublishFailed(String),

    /// The network task is gone.
    #[error("Network task stopped")]
    ChannelClosed,
}

impl NetworkError {
    /// The surfaced error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }
}
