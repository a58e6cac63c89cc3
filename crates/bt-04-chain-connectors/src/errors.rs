//! Chain errors.
//!
//! Everything here surfaces with kind `chain` and the raw diagnostic
//! attached; the coordinator never retries a failed write on the caller's
//! behalf.

use shared_types::ErrorKind;
use thiserror::Error;

/// Errors from connector operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// No commitment with this transaction id.
    #[error("HTLC not found: {0}")]
    HtlcNotFound(String),

    /// The supplied preimage does not hash to the stored hash-lock.
    #[error("invalid secret")]
    InvalidSecret,

    /// Refund attempted before the locktime.
    #[error("locktime not reached: now={now}, locktime={locktime}")]
    LocktimeNotReached {
        /// Current chain time (height or unix seconds).
        now: u64,
        /// The commitment's locktime.
        locktime: u64,
    },

    /// The commitment was already spent.
    #[error("HTLC already spent: {0}")]
    AlreadySpent(String),

    /// The address is not known to this chain.
    #[error("unknown address: {0}")]
    UnknownAddress(String),

    /// The acting address does not control the branch being spent.
    #[error("address {0} cannot spend this branch")]
    WrongBranchKey(String),

    /// Funding address balance too low.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Current balance.
        have: u64,
        /// Requested amount.
        need: u64,
    },

    /// The chain rejected the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// No connector registered for this chain tag.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
}

impl ChainError {
    /// The surfaced error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Chain
    }
}
