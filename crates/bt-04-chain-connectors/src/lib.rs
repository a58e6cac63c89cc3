//! # Chain Connectors
//!
//! One capability surface per supported chain: fresh addresses, balances,
//! and the HTLC lock/claim/refund/status operations the settlement
//! coordinator drives.
//!
//! Two realizations ship:
//!
//! - [`UtxoConnector`] — the base chain. HTLCs are real redeem scripts
//!   (`IF <sha256/ripemd160 preimage check + recipient key> ELSE
//!   <locktime + refund key> ENDIF`) behind a P2SH escrow address, with
//!   locktimes as absolute block heights.
//! - [`AccountConnector`] — the quote chain. HTLCs are program instances
//!   keyed by `hash_lock` with explicit `claim(secret)`/`refund()` entry
//!   points and wall-clock locktimes.
//!
//! Both are deterministic in-process chains: block height and time come
//! from the injected [`shared_types::Clock`], so tests drive timeouts
//! without sleeping. RPC-backed connectors plug in behind the same trait.
//!
//! Private keys never cross this boundary. Callers pass a narrowly scoped
//! [`SigningMaterial`] handle that each operation uses and discards.

#![warn(missing_docs)]
#![warn(clippy::all)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod account;
pub mod connector;
pub mod errors;
pub mod registry;
pub mod script;
pub mod utxo;

pub use account::{AccountConnector, AccountProfile};
pub use connector::{
    ChainConnector, ChainMeta, ClaimHtlcParams, HtlcState, HtlcStatus, LockHtlcParams,
    LockOutcome, NewAddress, RefundHtlcParams, SigningMaterial,
};
pub use errors::ChainError;
pub use registry::ConnectorRegistry;
pub use utxo::{UtxoConnector, UtxoProfile};
