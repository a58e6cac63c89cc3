//! # ECIES
//!
//! One-shot hybrid encryption to a peer's identity key.
//!
//! A fresh ephemeral secp256k1 keypair is generated per message; ECDH
//! against the recipient's long-term key yields the shared point, and the
//! session key is derived with HKDF-SHA256 under a fixed context string.
//! The payload is sealed with ChaCha20-Poly1305 (96-bit random nonce,
//! 128-bit tag).
//!
//! Wire envelope: `{ephemeral_pubkey(65), nonce(12), ciphertext(var), tag(16)}`.

use crate::errors::CryptoError;
use crate::identity::{IdentityKeyPair, IdentityPublicKey};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ecdh, PublicKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use sha2::Sha256;
use zeroize::Zeroize;

/// HKDF context string binding derived keys to this protocol.
const ECIES_CONTEXT: &[u8] = b"blacktrace-ecies";

/// AEAD tag length in bytes.
const TAG_LEN: usize = 16;

/// An ECIES ciphertext envelope.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EciesEnvelope {
    /// Uncompressed SEC1 ephemeral public key.
    #[serde_as(as = "serde_with::Bytes")]
    pub ephemeral_pubkey: [u8; 65],
    /// Random AEAD nonce.
    #[serde_as(as = "serde_with::Bytes")]
    pub nonce: [u8; 12],
    /// Sealed payload without the tag.
    pub ciphertext: Vec<u8>,
    /// Poly1305 authentication tag.
    #[serde_as(as = "serde_with::Bytes")]
    pub tag: [u8; 16],
}

/// Derive the AEAD session key from an ECDH shared secret.
fn derive_key(shared: &ecdh::SharedSecret) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes());
    let mut key = [0u8; 32];
    // Expanding 32 bytes out of HKDF-SHA256 cannot fail.
    hk.expand(ECIES_CONTEXT, &mut key)
        .unwrap_or_else(|_| unreachable!("HKDF output length is fixed"));
    key
}

/// Encrypt `plaintext` to the holder of `recipient`.
///
/// # Errors
///
/// Returns `CryptoError::InvalidPublicKey` if the recipient key is not a
/// curve point, or `CryptoError::EncryptionFailed` if sealing fails.
pub fn encrypt(
    recipient: &IdentityPublicKey,
    plaintext: &[u8],
) -> Result<EciesEnvelope, CryptoError> {
    let recipient_point = PublicKey::from_sec1_bytes(recipient.as_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let ephemeral = ecdh::EphemeralSecret::random(&mut rand::thread_rng());
    let ephemeral_point = ephemeral.public_key();

    let shared = ephemeral.diffie_hellman(&recipient_point);
    let mut key = derive_key(&shared);

    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new((&key).into());
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    key.zeroize();

    // The AEAD appends the tag; split it back out for the wire layout.
    let split = sealed.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&sealed[split..]);

    let encoded = ephemeral_point.to_encoded_point(false);
    let mut ephemeral_pubkey = [0u8; 65];
    ephemeral_pubkey.copy_from_slice(encoded.as_bytes());

    Ok(EciesEnvelope {
        ephemeral_pubkey,
        nonce,
        ciphertext: sealed[..split].to_vec(),
        tag,
    })
}

/// Decrypt an envelope with the recipient's identity keypair.
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` when authentication fails —
/// tampering and wrong-recipient are indistinguishable, and callers treat
/// both as "not for me".
pub fn decrypt(
    recipient: &IdentityKeyPair,
    envelope: &EciesEnvelope,
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral_point = PublicKey::from_sec1_bytes(&envelope.ephemeral_pubkey)
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let shared = ecdh::diffie_hellman(
        recipient.scalar().as_nonzero_scalar(),
        ephemeral_point.as_affine(),
    );
    let mut key = derive_key(&shared);

    let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&envelope.ciphertext);
    sealed.extend_from_slice(&envelope.tag);

    let cipher = ChaCha20Poly1305::new((&key).into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), sealed.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed);
    key.zeroize();

    plaintext
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let recipient = IdentityKeyPair::generate();
        let plaintext = b"price=12 amount=100";

        let envelope = encrypt(&recipient.public_key(), plaintext).unwrap();
        let decrypted = decrypt(&recipient, &envelope).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_roundtrip_large_payload() {
        let recipient = IdentityKeyPair::generate();
        let plaintext = vec![0x5Au8; 1 << 20];

        let envelope = encrypt(&recipient.public_key(), &plaintext).unwrap();
        assert_eq!(decrypt(&recipient, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();

        let envelope = encrypt(&recipient.public_key(), b"secret terms").unwrap();
        assert!(matches!(
            decrypt(&other, &envelope),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let recipient = IdentityKeyPair::generate();
        let mut envelope = encrypt(&recipient.public_key(), b"secret terms").unwrap();
        envelope.ciphertext[0] ^= 0xFF;
        assert!(decrypt(&recipient, &envelope).is_err());
    }

    #[test]
    fn test_tampered_tag_fails() {
        let recipient = IdentityKeyPair::generate();
        let mut envelope = encrypt(&recipient.public_key(), b"secret terms").unwrap();
        envelope.tag[0] ^= 0xFF;
        assert!(decrypt(&recipient, &envelope).is_err());
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let recipient = IdentityKeyPair::generate();
        let mut envelope = encrypt(&recipient.public_key(), b"secret terms").unwrap();
        envelope.nonce[0] ^= 0xFF;
        assert!(decrypt(&recipient, &envelope).is_err());
    }

    #[test]
    fn test_tampered_ephemeral_key_fails() {
        let recipient = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let mut envelope = encrypt(&recipient.public_key(), b"secret terms").unwrap();

        // Swap in a different (valid) ephemeral point.
        let decoy = encrypt(&other.public_key(), b"decoy").unwrap();
        envelope.ephemeral_pubkey = decoy.ephemeral_pubkey;
        assert!(decrypt(&recipient, &envelope).is_err());
    }

    #[test]
    fn test_fresh_ephemeral_per_message() {
        let recipient = IdentityKeyPair::generate();
        let a = encrypt(&recipient.public_key(), b"same").unwrap();
        let b = encrypt(&recipient.public_key(), b"same").unwrap();
        assert_ne!(a.ephemeral_pubkey, b.ephemeral_pubkey);
        assert_ne!(a.nonce, b.nonce);
    }
}
