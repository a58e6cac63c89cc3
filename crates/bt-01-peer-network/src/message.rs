//! Wire framing for the transport.
//!
//! Gossip messages are bincode-serialized signed envelopes. Direct
//! unicast uses a CBOR request/response pair: a frame of one or more
//! envelopes, acknowledged by an empty response when the peer has read
//! the stream.

use serde::{Deserialize, Serialize};
use shared_crypto::SignedEnvelope;

/// One or more framed signed messages on a direct stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectFrame {
    /// The signed messages, in send order.
    pub envelopes: Vec<SignedEnvelope>,
}

/// Acknowledgement that a direct frame was received.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DirectAck;

/// Serialize an envelope for gossip propagation.
///
/// # Errors
///
/// Bincode encoding of an envelope cannot practically fail; any error is
/// surfaced as a string for the caller to log.
pub fn encode_envelope(envelope: &SignedEnvelope) -> Result<Vec<u8>, String> {
    bincode::serialize(envelope).map_err(|e| e.to_string())
}

/// Deserialize an envelope from gossip bytes.
pub fn decode_envelope(bytes: &[u8]) -> Result<SignedEnvelope, String> {
    bincode::deserialize(bytes).map_err(|e| e.to_string())
}
