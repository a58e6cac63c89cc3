//! # Settlement Status and Bus Records
//!
//! The settlement state machine vocabulary and the fixed payload records
//! for each settlement topic family.
//!
//! ## Topic families
//!
//! | Subject | Record | Direction |
//! |---------|--------|-----------|
//! | `settlement.request.<proposal_id>` | [`SettlementRequest`] | node → coordinator |
//! | `settlement.htlc.<proposal_id>` | [`HtlcParams`] | coordinator → nodes |
//! | `settlement.status.<proposal_id>` | [`StatusUpdate`] / [`SettlementNotice`] | bidirectional |
//! | `settlement.secret.<proposal_id>` | [`SecretReveal`] | coordinator → nodes |

use crate::ids::{OrderId, PeerTag, ProposalId};
use crate::secret::{Hash160, SwapSecret};
use serde::{Deserialize, Serialize};

/// Which side of the swap a message or action belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapParty {
    /// Holds the base asset; initiated the order.
    Maker,
    /// Holds the quote asset; accepted the order.
    Taker,
}

/// Settlement progress for one accepted proposal.
///
/// Transitions form a DAG: the happy path is monotone, and every
/// pre-complete state can fall into its refund terminal once the relevant
/// locktime passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Request ingested; hash-lock distributed; nothing locked yet.
    #[default]
    Ready,
    /// The maker's base-chain HTLC is confirmed.
    MakerLocked,
    /// The taker's quote-chain HTLC is confirmed.
    TakerLocked,
    /// Both legs are locked; the preimage may now be revealed.
    BothLocked,
    /// The maker claimed the quote leg, revealing the preimage on-chain.
    QuoteClaimed,
    /// The taker claimed the base leg with the revealed preimage.
    BaseClaimed,
    /// Both transfers observed deep enough; swap done.
    Complete,
    /// The maker refunded the base leg after its locktime.
    RefundedMaker,
    /// The taker refunded the quote leg after its locktime.
    RefundedTaker,
    /// Both legs were refunded after their locktimes.
    RefundedBoth,
}

impl SettlementStatus {
    /// Check whether the status may move to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: SettlementStatus) -> bool {
        use SettlementStatus as S;
        matches!(
            (self, next),
            // Happy path. Either side may confirm its lock first.
            (S::Ready, S::MakerLocked)
                | (S::Ready, S::TakerLocked)
                | (S::MakerLocked, S::TakerLocked)
                | (S::TakerLocked, S::MakerLocked)
                | (S::MakerLocked, S::BothLocked)
                | (S::TakerLocked, S::BothLocked)
                | (S::BothLocked, S::QuoteClaimed)
                | (S::QuoteClaimed, S::BaseClaimed)
                | (S::BaseClaimed, S::Complete)
                // Refund branches.
                | (S::MakerLocked, S::RefundedMaker)
                | (S::TakerLocked, S::RefundedTaker)
                | (S::BothLocked, S::RefundedBoth)
                | (S::QuoteClaimed, S::RefundedMaker)
        )
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::RefundedMaker | Self::RefundedTaker | Self::RefundedBoth
        )
    }

    /// Check if this is a refund terminal.
    #[must_use]
    pub fn is_refund(&self) -> bool {
        matches!(
            self,
            Self::RefundedMaker | Self::RefundedTaker | Self::RefundedBoth
        )
    }
}

/// Node → coordinator: begin settlement for an accepted proposal.
///
/// Carries the maker-supplied preimage; the coordinator derives the
/// hash-lock from it and holds the preimage in memory only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRequest {
    /// The accepted proposal.
    pub proposal_id: ProposalId,
    /// The order it settles.
    pub order_id: OrderId,
    /// Maker peer identifier.
    pub maker_peer: PeerTag,
    /// Taker peer identifier.
    pub taker_peer: PeerTag,
    /// Base-asset amount to lock on the base chain.
    pub base_amount: u64,
    /// Quote-asset amount to lock on the quote chain.
    pub quote_amount: u64,
    /// Tag of the quote settlement chain.
    pub chain_tag: String,
    /// The maker-supplied preimage for this swap.
    pub secret: SwapSecret,
}

/// Coordinator → nodes: derived parameters for an ingested request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcParams {
    /// The proposal being settled.
    pub proposal_id: ProposalId,
    /// `RIPEMD160(SHA256(secret))`, 20 bytes.
    pub hash_lock: Hash160,
    /// Base-chain refund locktime, unix seconds.
    pub base_locktime: u64,
    /// Quote-chain refund locktime, unix seconds. Strictly earlier than
    /// the base locktime.
    pub quote_locktime: u64,
}

/// Bidirectional status record: who locked/claimed what, with the on-chain
/// references and the per-party data needed for script construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// The proposal being settled.
    pub proposal_id: ProposalId,
    /// The transition this record reports.
    pub target: SettlementStatus,
    /// The party the reported action belongs to.
    pub party: SwapParty,
    /// Transaction id of the lock/claim/refund, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// Escrow (P2SH or program) address, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow_address: Option<String>,
    /// The party's pubkey hash for script construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey_hash: Option<Hash160>,
    /// The party's personal funding address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_address: Option<String>,
}

/// Coordinator → nodes: preimage reveal after both legs are locked.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretReveal {
    /// The proposal being settled.
    pub proposal_id: ProposalId,
    /// The preimage, now safe to publish.
    pub secret: SwapSecret,
}

/// Kinds of coordinator notices surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "party")]
pub enum NoticeKind {
    /// The named party's refund branch is now spendable.
    RefundReady(SwapParty),
    /// The preimage is publicly observable; the named party should claim.
    SecretAvailable(SwapParty),
}

/// A coordinator notice on the status subject of a proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementNotice {
    /// The proposal the notice concerns.
    pub proposal_id: ProposalId,
    /// What is being surfaced.
    #[serde(flatten)]
    pub kind: NoticeKind,
}

/// Any record that travels on the settlement bus, with its subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "record")]
pub enum SettlementPayload {
    /// `settlement.request.<id>`.
    Request(SettlementRequest),
    /// `settlement.htlc.<id>`.
    Htlc(HtlcParams),
    /// `settlement.status.<id>`.
    Status(StatusUpdate),
    /// `settlement.secret.<id>`.
    Secret(SecretReveal),
    /// `settlement.status.<id>` (notices share the status family).
    Notice(SettlementNotice),
}

impl SettlementPayload {
    /// The bus subject this payload is routed on.
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::Request(r) => format!("settlement.request.{}", r.proposal_id),
            Self::Htlc(h) => format!("settlement.htlc.{}", h.proposal_id),
            Self::Status(s) => format!("settlement.status.{}", s.proposal_id),
            Self::Secret(s) => format!("settlement.secret.{}", s.proposal_id),
            Self::Notice(n) => format!("settlement.status.{}", n.proposal_id),
        }
    }

    /// The proposal this payload concerns.
    #[must_use]
    pub fn proposal_id(&self) -> &ProposalId {
        match self {
            Self::Request(r) => &r.proposal_id,
            Self::Htlc(h) => &h.proposal_id,
            Self::Status(s) => &s.proposal_id,
            Self::Secret(s) => &s.proposal_id,
            Self::Notice(n) => &n.proposal_id,
        }
    }
}
