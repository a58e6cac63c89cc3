//! # Crypto Errors

use shared_types::ErrorKind;
use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Not a valid curve point.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Not a valid secret scalar.
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Malformed signature bytes.
    #[error("Invalid signature encoding")]
    InvalidSignature,

    /// Signature does not verify under the claimed key.
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// AEAD sealing failed.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication failed on decrypt. Either the ciphertext was
    /// tampered with or the message is not for this recipient; the two
    /// are indistinguishable by design.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Envelope timestamp outside the receiver's replay window.
    #[error("Stale envelope: {age_secs}s old, window {window_secs}s")]
    StaleEnvelope {
        /// How old the envelope claims to be.
        age_secs: u64,
        /// The receiver's window.
        window_secs: u64,
    },

    /// Payload bytes did not decode as the expected record.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl CryptoError {
    /// The surfaced error kind for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Crypto
    }
}
