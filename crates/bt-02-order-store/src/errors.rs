//! # Store Errors

use shared_types::{ErrorKind, OrderId, OrderPhase, ProposalId, ProposalStatus, SettlementStatus};
use thiserror::Error;

/// Errors from table operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No order with this id.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No proposal with this id.
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    /// An order with this id already exists.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// A proposal with this id already exists.
    #[error("Proposal already exists: {0}")]
    DuplicateProposal(ProposalId),

    /// The order phase may not move this way.
    #[error("Invalid order phase transition: {from:?} -> {to:?}")]
    InvalidPhaseTransition {
        /// Current phase.
        from: OrderPhase,
        /// Attempted phase.
        to: OrderPhase,
    },

    /// The proposal status may not move this way.
    #[error("Invalid proposal status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition {
        /// Current status.
        from: ProposalStatus,
        /// Attempted status.
        to: ProposalStatus,
    },

    /// The settlement status may not move this way.
    #[error("Invalid settlement transition: {from:?} -> {to:?}")]
    InvalidSettlementTransition {
        /// Current status (`None` = settlement not started).
        from: Option<SettlementStatus>,
        /// Attempted status.
        to: SettlementStatus,
    },

    /// Another proposal on this order is already accepted.
    #[error("Order already accepted: {0}")]
    OrderAlreadyAccepted(OrderId),

    /// A different hash-lock is already recorded for this proposal.
    #[error("Hash-lock conflict on proposal {0}")]
    HashLockConflict(ProposalId),
}

impl StoreError {
    /// The surfaced error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OrderNotFound(_) | Self::ProposalNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Precondition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kind() {
        let err = StoreError::OrderNotFound(OrderId::from_nanos(1));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_precondition_kind() {
        let err = StoreError::OrderAlreadyAccepted(OrderId::from_nanos(1));
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}
