//! # BlackTrace Test Suite
//!
//! Unified test crate driving cross-subsystem swap scenarios over a wired
//! in-process deployment: two negotiation engines on a loopback
//! transport, one settlement bus, one coordinator, and one pair of
//! deterministic chains shared by both parties.
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Two-party wiring helpers
//! └── integration/      # Swap scenarios and message security
//! ```
//!
//! Run with `cargo test -p bt-tests`.

#![allow(dead_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod harness;
pub mod integration;
