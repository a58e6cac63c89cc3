//! # Hashing
//!
//! SHA-256 and the composed RIPEMD160∘SHA256 digest. The 20-byte
//! double-hash keeps hash-locks spendable by the classic UTXO opcode pair
//! (`OP_SHA256 OP_RIPEMD160`).

use rand::RngCore;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use shared_types::{Hash160, SwapSecret};

/// SHA-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `RIPEMD160(SHA256(data))`, 20 bytes.
#[must_use]
pub fn hash160(data: &[u8]) -> Hash160 {
    let inner = sha256(data);
    let mut hasher = Ripemd160::new();
    hasher.update(inner);
    let digest: [u8; 20] = hasher.finalize().into();
    Hash160::new(digest)
}

/// The hash-lock for a swap preimage.
#[must_use]
pub fn hash_lock(secret: &SwapSecret) -> Hash160 {
    hash160(secret.as_bytes())
}

/// Generate a fresh 32-byte preimage from the OS RNG.
#[must_use]
pub fn generate_secret() -> SwapSecret {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SwapSecret::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash160_known_vector() {
        // RIPEMD160(SHA256("")).
        let digest = hash160(b"");
        assert_eq!(
            digest.to_string(),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }

    #[test]
    fn test_hash_lock_is_deterministic() {
        let secret = SwapSecret::new([0x01u8; 32]);
        assert_eq!(hash_lock(&secret), hash_lock(&secret));
        assert_eq!(hash_lock(&secret), hash160(&secret.expose()));
    }

    #[test]
    fn test_generated_secrets_differ() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a.expose(), b.expose());
    }
}
