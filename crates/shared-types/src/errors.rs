//! # Error Kinds
//!
//! The eight error kinds every surfaced failure maps onto. Subsystem
//! crates keep their own `thiserror` enums; each exposes a `kind()` so the
//! gateway can translate uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a surfaced failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No session or expired session.
    Auth,
    /// Referenced record does not exist.
    NotFound,
    /// State-machine violation.
    Precondition,
    /// Signature or decryption failure.
    Crypto,
    /// Peer unreachable or stream failure.
    Transport,
    /// RPC or on-chain rejection.
    Chain,
    /// Deadline exceeded.
    Timeout,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, as carried on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Precondition => "precondition",
            Self::Crypto => "crypto",
            Self::Transport => "transport",
            Self::Chain => "chain",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::Precondition.to_string(), "precondition");
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for kind in [
            ErrorKind::Auth,
            ErrorKind::NotFound,
            ErrorKind::Precondition,
            ErrorKind::Crypto,
            ErrorKind::Transport,
            ErrorKind::Chain,
            ErrorKind::Timeout,
            ErrorKind::Internal,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
