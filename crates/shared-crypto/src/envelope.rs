//! # Signed Envelopes
//!
//! The authenticated wrapper around every negotiation-layer payload.
//!
//! The signature covers `type ‖ payload_bytes` under the sender's identity
//! key. The timestamp is transport metadata: receivers use it for a replay
//! bound but it is never part of the signed input.

use crate::errors::CryptoError;
use crate::identity::{IdentityKeyPair, IdentityPublicKey, IdentitySignature};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Recommended receiver-side replay window: reject envelopes older than
/// five minutes by the local clock.
pub const DEFAULT_REPLAY_WINDOW_SECS: u64 = 300;

/// A signed message envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Message type tag, part of the signed input.
    pub msg_type: String,
    /// Opaque payload bytes, part of the signed input.
    pub payload: Vec<u8>,
    /// ECDSA signature over `msg_type ‖ payload`.
    pub signature: IdentitySignature,
    /// The sender's identity key.
    pub signer_pubkey: IdentityPublicKey,
    /// Send time, unix seconds. Advisory; not signed.
    pub timestamp: u64,
}

/// The exact byte string the signature covers.
fn signing_input(msg_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(msg_type.len() + payload.len());
    input.extend_from_slice(msg_type.as_bytes());
    input.extend_from_slice(payload);
    input
}

impl SignedEnvelope {
    /// Sign raw payload bytes into an envelope.
    #[must_use]
    pub fn seal(keypair: &IdentityKeyPair, msg_type: &str, payload: Vec<u8>, now: u64) -> Self {
        let signature = keypair.sign(&signing_input(msg_type, &payload));
        Self {
            msg_type: msg_type.to_string(),
            payload,
            signature,
            signer_pubkey: keypair.public_key(),
            timestamp: now,
        }
    }

    /// Encode a record with bincode and sign it into an envelope.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedPayload` if the record fails to encode.
    pub fn seal_record<T: Serialize>(
        keypair: &IdentityKeyPair,
        msg_type: &str,
        record: &T,
        now: u64,
    ) -> Result<Self, CryptoError> {
        let payload =
            bincode::serialize(record).map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
        Ok(Self::seal(keypair, msg_type, payload, now))
    }

    /// Verify the signature and return the signer key.
    ///
    /// # Errors
    ///
    /// Returns a `crypto` error if the key is malformed or the signature
    /// does not cover `msg_type ‖ payload`.
    pub fn verify(&self) -> Result<IdentityPublicKey, CryptoError> {
        self.signer_pubkey
            .verify(&signing_input(&self.msg_type, &self.payload), &self.signature)?;
        Ok(self.signer_pubkey)
    }

    /// Verify the signature and apply the replay window to the timestamp.
    ///
    /// # Errors
    ///
    /// As [`verify`](Self::verify), plus `CryptoError::StaleEnvelope` when
    /// the envelope is older than `window_secs` by the local clock.
    pub fn verify_fresh(
        &self,
        now: u64,
        window_secs: u64,
    ) -> Result<IdentityPublicKey, CryptoError> {
        let signer = self.verify()?;
        let age = now.saturating_sub(self.timestamp);
        if age > window_secs {
            return Err(CryptoError::StaleEnvelope {
                age_secs: age,
                window_secs,
            });
        }
        Ok(signer)
    }

    /// Decode the payload as a bincode record.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedPayload` if the bytes do not decode.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, CryptoError> {
        bincode::deserialize(&self.payload)
            .map_err(|e| CryptoError::MalformedPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u64,
    }

    #[test]
    fn test_seal_verify_roundtrip() {
        let keypair = IdentityKeyPair::generate();
        let envelope =
            SignedEnvelope::seal_record(&keypair, "ping", &Ping { seq: 7 }, 1_000).unwrap();

        let signer = envelope.verify().unwrap();
        assert_eq!(signer, keypair.public_key());
        assert_eq!(envelope.decode_payload::<Ping>().unwrap(), Ping { seq: 7 });
    }

    #[test]
    fn test_tampered_payload_fails() {
        let keypair = IdentityKeyPair::generate();
        let mut envelope = SignedEnvelope::seal(&keypair, "ping", vec![1, 2, 3], 1_000);
        envelope.payload[0] = 9;
        assert!(envelope.verify().is_err());
    }

    #[test]
    fn test_tampered_type_fails() {
        let keypair = IdentityKeyPair::generate();
        let mut envelope = SignedEnvelope::seal(&keypair, "ping", vec![1, 2, 3], 1_000);
        envelope.msg_type = "pong".to_string();
        assert!(envelope.verify().is_err());
    }

    #[test]
    fn test_timestamp_is_not_signed() {
        // Mutating the timestamp must not break the signature; the replay
        // window is a separate check.
        let keypair = IdentityKeyPair::generate();
        let mut envelope = SignedEnvelope::seal(&keypair, "ping", vec![1, 2, 3], 1_000);
        envelope.timestamp = 9_999;
        assert!(envelope.verify().is_ok());
    }

    #[test]
    fn test_replay_window() {
        let keypair = IdentityKeyPair::generate();
        let envelope = SignedEnvelope::seal(&keypair, "ping", vec![], 1_000);

        assert!(envelope
            .verify_fresh(1_000 + DEFAULT_REPLAY_WINDOW_SECS, DEFAULT_REPLAY_WINDOW_SECS)
            .is_ok());
        assert!(matches!(
            envelope.verify_fresh(
                1_000 + DEFAULT_REPLAY_WINDOW_SECS + 1,
                DEFAULT_REPLAY_WINDOW_SECS
            ),
            Err(CryptoError::StaleEnvelope { .. })
        ));
    }

    #[test]
    fn test_future_timestamp_is_tolerated() {
        // Clock skew: an envelope "from the future" has zero age.
        let keypair = IdentityKeyPair::generate();
        let envelope = SignedEnvelope::seal(&keypair, "ping", vec![], 2_000);
        assert!(envelope.verify_fresh(1_000, 300).is_ok());
    }
}
