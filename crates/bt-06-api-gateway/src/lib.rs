//! # API Gateway
//!
//! The HTTP/REST control surface over the node.
//!
//! ## Endpoints
//!
//! | Area | Routes |
//! |------|--------|
//! | Orders | `POST /orders`, `GET /orders`, `GET /orders/:id` |
//! | Negotiation | `POST /orders/:id/request-details`, `POST /orders/:id/proposals`, `GET /orders/:id/proposals`, `POST /proposals/:id/accept`, `POST /proposals/:id/reject` |
//! | Settlement | `POST /settlement/:id/{lock,claim,refund}/{base,quote}`, `GET /settlement/pending`, `GET /settlement/:id` |
//! | Network | `GET /network/status`, `GET /network/peers`, `GET /health` |
//!
//! Authentication is an opaque bearer session token validated against the
//! in-memory session table; issuing tokens is the external identity
//! store's concern. `/health` is unauthenticated.
//!
//! Settlement lock/claim/refund calls carry per-action signing material;
//! it flows through to the chain connector for the single call and is
//! never persisted.

#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod ports;
pub mod routes;
pub mod session;
pub mod types;

pub use error::ApiError;
pub use ports::{ActionInput, ActionReceipt, NetworkInfo, SettlementActions, SettlementView, SwapLeg};
pub use routes::{router, AppState};
pub use session::SessionStore;
