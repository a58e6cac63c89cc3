//! # Settlement Coordinator
//!
//! Drives the HTLC dance across the two chains for every accepted
//! proposal.
//!
//! ## Responsibilities
//!
//! - Ingest `settlement.request` records, derive the hash-lock from the
//!   maker's preimage, and advertise it with the two locktimes.
//! - Walk the settlement DAG from `settlement.status` records, with every
//!   handler idempotent on `(proposal_id, transition_target)`.
//! - Hold the preimage in memory only, and publish it on
//!   `settlement.secret` strictly after observing `both_locked` — then
//!   re-emit with exponential backoff until the base locktime for takers
//!   that come online late.
//! - Enforce the asymmetric timeout policy (`T_Q < T_B` with a margin
//!   covering both chains' finality windows) and surface
//!   `refund_ready`/`secret_available` notices when locktimes pass.
//! - Reconcile with on-chain reality by polling the connectors; the first
//!   confirmed spend is canonical.
//! - Retain terminal records for an observability window, then collect.
//!
//! The coordinator never broadcasts on-chain transactions for users; the
//! claim order is enforced by economics, not by this process.

#![warn(missing_docs)]
#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod record;

pub use config::SettlementConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, SwapSnapshot};
pub use errors::SettlementError;
pub use record::SwapRecord;
