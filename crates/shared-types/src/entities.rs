//! # Negotiation Entities
//!
//! Orders and proposals, with their lifecycle state machines.
//!
//! Orders are owned by the order store and mutated only through the
//! negotiation engine; peers observe them via announcements. A targeted
//! order is broadcast as a stub — zeroed amount and prices — and the full
//! record travels only inside an encrypted details message to the intended
//! taker.

use crate::ids::{OrderId, PeerTag, ProposalId};
use crate::secret::Hash160;
use crate::settlement::SettlementStatus;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of an order, from the maker's perspective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPhase {
    /// Created locally, not yet announced.
    #[default]
    Created,
    /// Announcement broadcast to the network.
    Announced,
    /// A taker asked for the full details of a targeted order.
    DetailsRequested,
    /// Encrypted details sent to the requesting taker.
    DetailsSent,
    /// At least one proposal received.
    ProposalsOpen,
    /// One proposal accepted; the order left the available pool.
    Accepted,
    /// Timed out or cancelled.
    Expired,
}

impl OrderPhase {
    /// Check whether the phase may move to `next`.
    ///
    /// Any non-terminal phase may expire; otherwise transitions follow the
    /// announcement → details → proposals → acceptance flow.
    #[must_use]
    pub fn can_transition_to(&self, next: OrderPhase) -> bool {
        if next == OrderPhase::Expired {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Created, Self::Announced)
                | (Self::Announced, Self::DetailsRequested)
                | (Self::Announced, Self::ProposalsOpen)
                | (Self::DetailsRequested, Self::DetailsSent)
                | (Self::DetailsSent, Self::DetailsRequested)
                | (Self::DetailsSent, Self::ProposalsOpen)
                | (Self::ProposalsOpen, Self::Accepted)
        )
    }

    /// Check if this is a terminal phase.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Expired)
    }
}

/// A sell-side order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Monotonic order identifier.
    pub order_id: OrderId,
    /// The maker's peer identifier.
    pub maker_peer: PeerTag,
    /// Amount of the base asset, in integer base units.
    pub amount: u64,
    /// Tag of the quote asset the maker is paid in.
    pub quote_asset_tag: String,
    /// Lowest acceptable price, in quote units per base unit.
    pub min_price: u64,
    /// Highest advertised price, in quote units per base unit.
    pub max_price: u64,
    /// Tag of the chain the quote leg settles on.
    pub settlement_chain_tag: String,
    /// Creation time, unix seconds.
    pub timestamp: u64,
    /// When set, only this taker receives the full details.
    pub target_taker: Option<PeerTag>,
    /// Current lifecycle phase.
    pub phase: OrderPhase,
    /// True when this record is the zeroed broadcast form of a targeted
    /// order and the real fields are still undisclosed.
    pub stub: bool,
}

impl Order {
    /// Whether the order is addressed to a single taker.
    #[must_use]
    pub fn is_targeted(&self) -> bool {
        self.target_taker.is_some()
    }

    /// The zeroed form of a targeted order, safe to broadcast publicly.
    #[must_use]
    pub fn to_stub(&self) -> Order {
        Order {
            order_id: self.order_id.clone(),
            maker_peer: self.maker_peer.clone(),
            amount: 0,
            quote_asset_tag: self.quote_asset_tag.clone(),
            min_price: 0,
            max_price: 0,
            settlement_chain_tag: self.settlement_chain_tag.clone(),
            timestamp: self.timestamp,
            target_taker: self.target_taker.clone(),
            phase: self.phase,
            stub: true,
        }
    }
}

/// Status of a proposal. Monotone: `Pending` resolves exactly once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Awaiting the maker's decision.
    #[default]
    Pending,
    /// Selected by the maker; settlement begins.
    Accepted,
    /// Declined by the maker.
    Rejected,
}

impl ProposalStatus {
    /// Check whether the status may move to `next`. No reversals.
    #[must_use]
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted) | (Self::Pending, Self::Rejected)
        )
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

/// A price/amount proposal from a taker on an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// `order_id ‖ nanotimestamp`.
    pub proposal_id: ProposalId,
    /// Back-pointer to the order.
    pub order_id: OrderId,
    /// The proposing taker's peer identifier.
    pub proposer_peer: PeerTag,
    /// Offered amount of the base asset.
    pub amount: u64,
    /// Offered price, in quote units per base unit.
    pub price: u64,
    /// Negotiation status.
    pub status: ProposalStatus,
    /// Settlement progress mirror; absent until settlement begins.
    pub settlement_status: Option<SettlementStatus>,
    /// Agreed hash-lock; set at acceptance.
    pub hash_lock: Option<Hash160>,
    /// Creation time, unix seconds.
    pub timestamp: u64,
}
