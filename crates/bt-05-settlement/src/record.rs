//! The coordinator's per-swap record.
//!
//! Owned exclusively by the coordinator task. The preimage lives here in
//! memory only, behind an accessor, until it is published on the secret
//! topic; the record zeroizes it on drop.

use crate::errors::SettlementError;
use shared_types::{Hash160, OrderId, PeerTag, ProposalId, SettlementStatus, SwapSecret};

/// Coordinator-owned settlement state for one accepted proposal.
#[derive(Debug)]
pub struct SwapRecord {
    /// The proposal being settled.
    pub proposal_id: ProposalId,
    /// The order it came from.
    pub order_id: OrderId,
    /// Maker peer identifier.
    pub maker_peer: PeerTag,
    /// Taker peer identifier.
    pub taker_peer: PeerTag,
    /// Base-asset amount.
    pub base_amount: u64,
    /// Quote-asset amount.
    pub quote_amount: u64,
    /// Quote settlement chain tag.
    pub chain_tag: String,
    /// `RIPEMD160(SHA256(secret))`.
    pub hash_lock: Hash160,
    /// Maker's pubkey hash for script construction, once supplied.
    pub maker_pubkey_hash: Option<Hash160>,
    /// Taker's pubkey hash for script construction, once supplied.
    pub taker_pubkey_hash: Option<Hash160>,
    /// Base-chain lock transaction, once observed.
    pub base_lock_tx: Option<String>,
    /// Base-chain escrow address, once observed.
    pub base_escrow_address: Option<String>,
    /// Base-chain refund locktime, absolute unix seconds.
    pub base_locktime: u64,
    /// Quote-chain lock transaction, once observed.
    pub quote_lock_tx: Option<String>,
    /// Quote-chain refund locktime, absolute unix seconds.
    pub quote_locktime: u64,
    /// Current settlement status.
    pub status: SettlementStatus,
    /// Ingest time, unix seconds.
    pub created_at: u64,
    /// Last transition time, unix seconds.
    pub updated_at: u64,
    /// When a terminal state was reached.
    pub terminal_at: Option<u64>,
    /// Whether the preimage has been published at least once.
    pub secret_published: bool,
    /// Next scheduled secret re-emission, unix seconds.
    pub secret_reemit_at: Option<u64>,
    /// Current re-emission backoff, seconds.
    pub secret_reemit_backoff: u64,
    /// Last time a timeout notice was surfaced, unix seconds.
    pub last_notice_at: u64,

    secret: SwapSecret,
}

impl SwapRecord {
    /// Create a record at `Ready`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        proposal_id: ProposalId,
        order_id: OrderId,
        maker_peer: PeerTag,
        taker_peer: PeerTag,
        base_amount: u64,
        quote_amount: u64,
        chain_tag: String,
        secret: SwapSecret,
        hash_lock: Hash160,
        base_locktime: u64,
        quote_locktime: u64,
        now: u64,
    ) -> Self {
        Self {
            proposal_id,
            order_id,
            maker_peer,
            taker_peer,
            base_amount,
            quote_amount,
            chain_tag,
            hash_lock,
            maker_pubkey_hash: None,
            taker_pubkey_hash: None,
            base_lock_tx: None,
            base_escrow_address: None,
            base_locktime,
            quote_lock_tx: None,
            quote_locktime,
            status: SettlementStatus::Ready,
            created_at: now,
            updated_at: now,
            terminal_at: None,
            secret_published: false,
            secret_reemit_at: None,
            secret_reemit_backoff: 0,
            last_notice_at: 0,
            secret,
        }
    }

    /// The preimage. Memory-only; callers publish it exactly where the
    /// protocol allows.
    #[must_use]
    pub fn secret(&self) -> &SwapSecret {
        &self.secret
    }

    /// Apply a transition. Idempotent: the current status is a no-op.
    ///
    /// # Returns
    ///
    /// `true` when the status changed.
    ///
    /// # Errors
    ///
    /// `SettlementError::InvalidTransition` for edges outside the DAG.
    pub fn apply_status(
        &mut self,
        target: SettlementStatus,
        now: u64,
    ) -> Result<bool, SettlementError> {
        if self.status == target {
            return Ok(false);
        }
        if !self.status.can_transition_to(target) {
            return Err(SettlementError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = now;
        if target.is_terminal() {
            self.terminal_at = Some(now);
        }
        Ok(true)
    }

    /// The refund terminal reachable from the current status, if any.
    #[must_use]
    pub fn refund_terminal(&self) -> Option<SettlementStatus> {
        match self.status {
            SettlementStatus::MakerLocked => Some(SettlementStatus::RefundedMaker),
            SettlementStatus::TakerLocked => Some(SettlementStatus::RefundedTaker),
            SettlementStatus::BothLocked => Some(SettlementStatus::RefundedBoth),
            SettlementStatus::QuoteClaimed => Some(SettlementStatus::RefundedMaker),
            _ => None,
        }
    }

    /// Whether both legs have confirmed locks.
    #[must_use]
    pub fn both_locks_observed(&self) -> bool {
        self.base_lock_tx.is_some() && self.quote_lock_tx.is_some()
    }
}

impl Drop for SwapRecord {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret.zeroize();
    }
}
