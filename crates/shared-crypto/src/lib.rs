//! # Shared Crypto - Message-Layer Cryptography
//!
//! Everything the negotiation layer needs to authenticate and
//! confidentially route messages between peers.
//!
//! ## Components
//!
//! | Module | Primitive | Use Case |
//! |--------|-----------|----------|
//! | `identity` | secp256k1 ECDSA | Per-user signing keypair |
//! | `envelope` | sign/verify over `type ‖ payload` | Authenticated messages |
//! | `ecies` | ECDH + HKDF-SHA256 + ChaCha20-Poly1305 | Per-recipient confidentiality |
//! | `key_cache` | pinned verification keys | Surfacing off-protocol key changes |
//! | `hashing` | SHA-256, RIPEMD160∘SHA256 | Hash-locks and digests |
//!
//! ## Security Properties
//!
//! - One curve for everything: the identity key signs envelopes and is the
//!   ECIES recipient key.
//! - A fresh ephemeral keypair per ECIES message gives forward secrecy.
//! - The envelope timestamp is transport metadata; the signature covers
//!   `type ‖ payload` only, and receivers apply a replay window to the
//!   timestamp separately.

#![warn(missing_docs)]
#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod ecies;
pub mod envelope;
pub mod errors;
pub mod hashing;
pub mod identity;
pub mod key_cache;

// Re-exports
pub use ecies::EciesEnvelope;
pub use envelope::{SignedEnvelope, DEFAULT_REPLAY_WINDOW_SECS};
pub use errors::CryptoError;
pub use hashing::{generate_secret, hash160, hash_lock, sha256};
pub use identity::{IdentityKeyPair, IdentityPublicKey, IdentitySignature};
pub use key_cache::{KeyEvent, PeerKeyCache};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
