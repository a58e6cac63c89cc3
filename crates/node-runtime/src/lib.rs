//! # BlackTrace Node Runtime
//!
//! Component wiring for a full node: peer transport, negotiation engine,
//! order store, settlement bus, coordinator, chain connectors, gateway,
//! and the node↔coordinator glue that ties negotiation acceptance to the
//! settlement state machine.
//!
//! All components are constructed explicitly in [`wiring`]; nothing is a
//! process-global. Lifecycle is tied to the shutdown watch channel the
//! binary owns.

#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod glue;
pub mod wiring;

pub use config::NodeConfig;
pub use glue::SettlementClient;
pub use wiring::Node;
