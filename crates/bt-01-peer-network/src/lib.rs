//! # Peer Network
//!
//! The transport layer under the negotiation engine: a libp2p swarm
//! providing
//!
//! - **Broadcast publish** — gossipsub fan-out of signed envelopes,
//!   best-effort, per-publisher ordering, no acknowledgement;
//! - **Direct unicast** — a short-lived request/response stream to one
//!   peer carrying one or more framed signed messages;
//! - **Discovery** — mDNS on the local network plus explicit
//!   dial-by-address;
//! - **Channel security** — Noise handshakes on every connection,
//!   independent of (and composing with) application-layer ECIES.
//!
//! The transport is a dumb pipe: it moves [`shared_crypto::SignedEnvelope`]
//! values and never inspects payload semantics. Replay and authenticity
//! checks belong to the crypto layer above.

#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod errors;
pub mod message;
pub mod network;

pub use config::NetworkConfig;
pub use errors::NetworkError;
pub use message::{DirectAck, DirectFrame};
pub use network::{Delivery, NetworkCommand, NetworkEvent, NetworkHandle, PeerNetwork};
