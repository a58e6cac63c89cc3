//! Ports into the node.
//!
//! The gateway drives settlement actions and reads network state through
//! these traits; the runtime wires the real implementations in.

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{PeerTag, ProposalId, SettlementStatus};

/// Which leg of the swap an action targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapLeg {
    /// The base chain (maker's asset).
    Base,
    /// The quote chain (taker's asset).
    Quote,
}

/// User-supplied per-action data for a lock/claim/refund.
///
/// Everything here is ephemeral: used for the one connector call and the
/// one status message, then dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionInput {
    /// Receiving address for a claim.
    #[serde(default)]
    pub recipient_address: Option<String>,
    /// Refund address for a lock or refund.
    #[serde(default)]
    pub refund_address: Option<String>,
    /// The party's pubkey hash (hex) for script construction.
    #[serde(default)]
    pub pubkey_hash: Option<String>,
    /// The party's personal funding address.
    #[serde(default)]
    pub funding_address: Option<String>,
    /// WIF or equivalent signing reference.
    pub signing_ref: String,
    /// Preimage (hex) for a base-leg claim; when absent the node uses
    /// the publicly revealed one.
    #[serde(default)]
    pub secret_hex: Option<String>,
}

/// Result of a settlement action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionReceipt {
    /// Transaction id of the broadcast action.
    pub tx_id: String,
    /// Escrow address, for locks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow_address: Option<String>,
}

/// Settlement progress as presented to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementView {
    /// The proposal being settled.
    pub proposal_id: ProposalId,
    /// Current settlement status, absent before settlement starts.
    #[serde(default)]
    pub settlement_status: Option<SettlementStatus>,
    /// The advertised hash-lock (hex).
    #[serde(default)]
    pub hash_lock: Option<String>,
    /// Base-chain lock transaction.
    #[serde(default)]
    pub base_lock_tx: Option<String>,
    /// Quote-chain lock transaction.
    #[serde(default)]
    pub quote_lock_tx: Option<String>,
    /// Base-chain refund locktime, unix seconds.
    #[serde(default)]
    pub base_locktime: Option<u64>,
    /// Quote-chain refund locktime, unix seconds.
    #[serde(default)]
    pub quote_locktime: Option<u64>,
}

/// Settlement operations the gateway exposes.
#[async_trait]
pub trait SettlementActions: Send + Sync {
    /// Lock funds on one leg.
    async fn lock(
        &self,
        proposal_id: ProposalId,
        leg: SwapLeg,
        input: ActionInput,
    ) -> Result<ActionReceipt, ApiError>;

    /// Claim one leg by revealing (or reusing) the preimage.
    async fn claim(
        &self,
        proposal_id: ProposalId,
        leg: SwapLeg,
        input: ActionInput,
    ) -> Result<ActionReceipt, ApiError>;

    /// Refund one leg via the timeout branch.
    async fn refund(
        &self,
        proposal_id: ProposalId,
        leg: SwapLeg,
        input: ActionInput,
    ) -> Result<ActionReceipt, ApiError>;

    /// Settlement progress for one proposal.
    async fn status(&self, proposal_id: ProposalId) -> Result<SettlementView, ApiError>;

    /// All proposals with unfinished settlement.
    async fn list_pending(&self) -> Result<Vec<SettlementView>, ApiError>;
}

/// Read-only network state for the status endpoints.
pub trait NetworkInfo: Send + Sync {
    /// The local transport peer id.
    fn local_peer(&self) -> PeerTag;
    /// Number of connected peers.
    fn peer_count(&self) -> usize;
    /// Connected peer ids.
    fn peers(&self) -> Vec<PeerTag>;
}
