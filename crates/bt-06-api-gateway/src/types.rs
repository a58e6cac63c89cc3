//! Request/response records.
//!
//! Unknown optional fields are tolerated on read and elided on write.

use serde::{Deserialize, Serialize};
use shared_types::{Order, OrderPhase, Proposal, ProposalStatus, SettlementStatus};

/// `POST /orders` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Amount of the base asset to sell.
    pub amount: u64,
    /// Quote asset tag.
    pub quote_asset_tag: String,
    /// Lowest acceptable price.
    pub min_price: u64,
    /// Highest advertised price.
    pub max_price: u64,
    /// Chain the quote leg settles on.
    pub settlement_chain_tag: String,
    /// Restrict details to this taker.
    #[serde(default)]
    pub target_taker: Option<String>,
}

/// `POST /orders/:id/proposals` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposeRequest {
    /// Offered price.
    pub price: u64,
    /// Offered amount.
    pub amount: u64,
}

/// `POST /proposals/:id/accept` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcceptRequest {
    /// The 32-byte swap preimage, hex encoded.
    pub secret: String,
}

/// Order as presented to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderView {
    /// Order id.
    pub order_id: String,
    /// Maker peer id.
    pub maker_peer: String,
    /// Base amount (zero on undisclosed stubs).
    pub amount: u64,
    /// Quote asset tag.
    pub quote_asset_tag: String,
    /// Lowest acceptable price.
    pub min_price: u64,
    /// Highest advertised price.
    pub max_price: u64,
    /// Settlement chain tag.
    pub settlement_chain_tag: String,
    /// Creation time, unix seconds.
    pub timestamp: u64,
    /// Lifecycle phase.
    pub phase: OrderPhase,
    /// Whether this is an undisclosed targeted stub.
    pub stub: bool,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            maker_peer: order.maker_peer.to_string(),
            amount: order.amount,
            quote_asset_tag: order.quote_asset_tag,
            min_price: order.min_price,
            max_price: order.max_price,
            settlement_chain_tag: order.settlement_chain_tag,
            timestamp: order.timestamp,
            phase: order.phase,
            stub: order.stub,
        }
    }
}

/// Proposal as presented to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalView {
    /// Proposal id.
    pub proposal_id: String,
    /// Order id.
    pub order_id: String,
    /// Proposing peer id.
    pub proposer_peer: String,
    /// Offered amount (zero when the terms are hidden from this node).
    pub amount: u64,
    /// Offered price (zero when hidden).
    pub price: u64,
    /// Negotiation status.
    pub status: ProposalStatus,
    /// Settlement progress mirror.
    #[serde(default)]
    pub settlement_status: Option<SettlementStatus>,
    /// Agreed hash-lock (hex), once accepted.
    #[serde(default)]
    pub hash_lock: Option<String>,
}

impl From<Proposal> for ProposalView {
    fn from(proposal: Proposal) -> Self {
        Self {
            proposal_id: proposal.proposal_id.to_string(),
            order_id: proposal.order_id.to_string(),
            proposer_peer: proposal.proposer_peer.to_string(),
            amount: proposal.amount,
            price: proposal.price,
            status: proposal.status,
            settlement_status: proposal.settlement_status,
            hash_lock: proposal.hash_lock.map(|h| h.to_string()),
        }
    }
}

/// `GET /network/status` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Local transport peer id.
    pub peer_id: String,
    /// Connected peer count.
    pub peer_count: usize,
    /// Orders held by the store.
    pub order_count: usize,
    /// Proposals held by the store.
    pub proposal_count: usize,
    /// Envelopes dropped for bad signatures.
    pub dropped_bad_signature: u64,
    /// Envelopes dropped for staleness.
    pub dropped_stale: u64,
    /// ECIES bodies that were not for this node.
    pub dropped_not_for_us: u64,
}

/// `GET /health` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Health {
    /// Always "ok" while the process serves requests.
    pub status: String,
}
