//! Coordinator errors.

use bt_04_chain_connectors::ChainError;
use shared_types::{ErrorKind, ProposalId, SettlementStatus};
use thiserror::Error;

/// Errors from settlement ingest and transitions.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// No swap with this proposal id.
    #[error("swap not found: {0}")]
    SwapNotFound(ProposalId),

    /// The locktime margin does not cover both finality windows.
    #[error(
        "invalid locktime margin: quote={quote_locktime}, base={base_locktime}, required_margin={required_margin}"
    )]
    InvalidLocktimeMargin {
        /// Quote-chain locktime.
        quote_locktime: u64,
        /// Base-chain locktime.
        base_locktime: u64,
        /// Required margin in seconds.
        required_margin: u64,
    },

    /// The settlement status may not move this way.
    #[error("invalid settlement transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: SettlementStatus,
        /// Attempted status.
        to: SettlementStatus,
    },

    /// Connector failure.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The coordinator task is gone.
    #[error("settlement coordinator stopped")]
    ChannelClosed,
}

impl SettlementError {
    /// The surfaced error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SwapNotFound(_) => ErrorKind::NotFound,
            Self::InvalidLocktimeMargin { .. } | Self::InvalidTransition { .. } => {
                ErrorKind::Precondition
            }
            Self::Chain(e) => e.kind(),
            Self::ChannelClosed => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::OrderId;

    #[test]
    fn test_margin_error_message() {
        let err = SettlementError::InvalidLocktimeMargin {
            quote_locktime: 100,
            base_locktime: 200,
            required_margin: 300,
        };
        assert!(err.to_string().contains("300"));
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_not_found_kind() {
        let id = ProposalId::derive(&OrderId::from_nanos(1), 2);
        assert_eq!(SettlementError::SwapNotFound(id).kind(), ErrorKind::NotFound);
    }
}
