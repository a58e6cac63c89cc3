//! Negotiation wire records.
//!
//! Each record is bincode-encoded into a signed envelope under its type
//! tag. Confidential fields travel as ECIES envelopes inside the signed
//! record, so third parties authenticate the message but cannot read the
//! terms.

use serde::{Deserialize, Serialize};
use shared_crypto::EciesEnvelope;
use shared_types::{Hash160, Order, OrderId, PeerTag, ProposalId};

/// Envelope type tag for order announcements.
pub const MSG_ORDER_ANNOUNCEMENT: &str = "order_announcement";
/// Envelope type tag for targeted-order detail requests.
pub const MSG_ORDER_REQUEST: &str = "order_request";
/// Envelope type tag for encrypted order details.
pub const MSG_ENCRYPTED_ORDER_DETAILS: &str = "encrypted_order_details";
/// Envelope type tag for proposals.
pub const MSG_PROPOSAL: &str = "proposal";
/// Envelope type tag for acceptance notices.
pub const MSG_PROPOSAL_ACCEPTANCE: &str = "proposal_acceptance";

/// Broadcast announcement of an order.
///
/// Public orders carry full details; targeted orders carry the zeroed
/// stub and disclose the rest only through
/// [`EncryptedOrderDetails`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderAnnouncement {
    /// The order, full or stubbed.
    pub order: Order,
}

/// A taker asks the maker for the full details of a targeted order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderRequest {
    /// The order being asked about.
    pub order_id: OrderId,
    /// The requesting taker.
    pub taker_peer: PeerTag,
}

/// Maker → taker: the full order, encrypted to the requester.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedOrderDetails {
    /// The order the details belong to.
    pub order_id: OrderId,
    /// ECIES envelope decrypting to the full [`Order`] record.
    pub body: EciesEnvelope,
}

/// The confidential part of a proposal, ECIES-encrypted to the maker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalBody {
    /// Offered amount of the base asset.
    pub amount: u64,
    /// Offered price, quote units per base unit.
    pub price: u64,
}

/// Broadcast proposal: a public stub plus the encrypted terms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalMsg {
    /// `order_id ‖ nanotimestamp`.
    pub proposal_id: ProposalId,
    /// The order being proposed on.
    pub order_id: OrderId,
    /// The proposing taker.
    pub proposer_peer: PeerTag,
    /// ECIES envelope decrypting to [`ProposalBody`]; only the maker
    /// can read the price and amount.
    pub body: EciesEnvelope,
}

/// Direct maker → proposer: acceptance with the agreed hash-lock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalAcceptance {
    /// The accepted proposal.
    pub proposal_id: ProposalId,
    /// `RIPEMD160(SHA256(secret))` committed by the maker.
    pub hash_lock: Hash160,
}
