//! Engine errors.

use bt_01_peer_network::NetworkError;
use bt_02_order_store::StoreError;
use shared_crypto::CryptoError;
use shared_types::{ErrorKind, OrderId, PeerTag, ProposalId};
use thiserror::Error;

/// Errors surfaced to negotiation command callers.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// No order with this id.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// No proposal with this id.
    #[error("proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    /// The command only makes sense for the order's maker.
    #[error("not my order: {0}")]
    NotMyOrder(OrderId),

    /// The order already has an accepted proposal.
    #[error("order already accepted: {0}")]
    OrderAlreadyAccepted(OrderId),

    /// The order timed out of the available pool.
    #[error("order expired: {0}")]
    OrderExpired(OrderId),

    /// Proposing on a targeted order whose details were never disclosed.
    #[error("order details not disclosed: {0}")]
    DetailsMissing(OrderId),

    /// No pinned verification key for the peer; nothing to encrypt to.
    #[error("no pinned key for peer {0}")]
    UnknownPeerKey(PeerTag),

    /// Store-level violation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Signature or encryption failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Transport failure on a direct stream.
    #[error(transparent)]
    Transport(#[from] NetworkError),

    /// The engine task is gone.
    #[error("negotiation engine stopped")]
    ChannelClosed,
}

impl NegotiationError {
    /// The surfaced error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OrderNotFound(_) | Self::ProposalNotFound(_) => ErrorKind::NotFound,
            Self::NotMyOrder(_)
            | Self::OrderAlreadyAccepted(_)
            | Self::OrderExpired(_)
            | Self::DetailsMissing(_) => ErrorKind::Precondition,
            Self::UnknownPeerKey(_) => ErrorKind::Precondition,
            Self::Store(e) => e.kind(),
            Self::Crypto(e) => e.kind(),
            Self::Transport(e) => e.kind(),
            Self::ChannelClosed => ErrorKind::Internal,
        }
    }
}
