//! # Negotiation Engine
//!
//! The state machine that takes an order from announcement to an accepted
//! proposal with an agreed hash-lock.
//!
//! ## Message types (all signed envelopes)
//!
//! | Type tag | Delivery | Body |
//! |----------|----------|------|
//! | `order_announcement` | broadcast | full order, or a zeroed stub for targeted orders |
//! | `order_request` | broadcast or direct | taker asks for targeted-order details |
//! | `encrypted_order_details` | direct | order ECIES-encrypted to the requesting taker |
//! | `proposal` | broadcast | stub plus price/amount ECIES-encrypted to the maker |
//! | `proposal_acceptance` | direct | accepted proposal id and the agreed hash-lock |
//!
//! ## Ownership
//!
//! The engine owns all writes to the order/proposal store; gateway
//! readers share the tables concurrently. One event-loop task serializes
//! command handling, inbound network messages, and the expiry sweep.
//!
//! Acceptance is the only step with cross-chain consequences: the maker
//! commits the swap preimage at acceptance, the hash-lock lands on the
//! proposal record and in the direct acceptance message, and the
//! settlement handoff leaves through the acceptance channel. From then on
//! negotiation-layer events no longer affect the swap.

#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod engine;
pub mod errors;
pub mod handle;
pub mod messages;
pub mod ports;
pub mod testing;

pub use config::NegotiationConfig;
pub use engine::{AcceptanceHandoff, EngineParams, NegotiationCounters, NegotiationEngine};
pub use errors::NegotiationError;
pub use handle::{CreateOrderParams, NegotiationCommand, NegotiationHandle};
pub use messages::{
    EncryptedOrderDetails, OrderAnnouncement, OrderRequest, ProposalAcceptance, ProposalBody,
    ProposalMsg, MSG_ENCRYPTED_ORDER_DETAILS, MSG_ORDER_ANNOUNCEMENT, MSG_ORDER_REQUEST,
    MSG_PROPOSAL, MSG_PROPOSAL_ACCEPTANCE,
};
pub use ports::Outbound;
