//! # Order/Proposal Store
//!
//! Keyed in-memory tables for orders and proposals, with the secondary
//! index `order_id → proposals` and compare-and-swap updates that enforce
//! the negotiation invariants:
//!
//! - status monotonicity (no reversals),
//! - at most one accepted proposal per order,
//! - settlement-status transitions restricted to the settlement DAG.
//!
//! ## Access discipline
//!
//! One readers/writer lock guards all three tables, so every mutation is
//! a single serialized critical section and readers (the gateway) run
//! concurrently. All mutating call sites live on the negotiation-engine
//! loop or the settlement-glue task; nothing else writes.

#![warn(missing_docs)]
#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod errors;
pub mod store;

pub use errors::StoreError;
pub use store::OrderStore;
