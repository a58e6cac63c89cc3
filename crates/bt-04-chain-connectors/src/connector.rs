//! The connector trait and its parameter records.

use crate::errors::ChainError;
use async_trait::async_trait;
use shared_types::{Hash160, SwapSecret};
use std::fmt;
use zeroize::Zeroizing;

/// Chain identity, for routing and display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainMeta {
    /// Stable chain identifier (the settlement chain tag).
    pub chain_id: String,
    /// Ticker of the asset this chain carries.
    pub asset_ticker: String,
}

/// Observable state of a commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HtlcState {
    /// Funds committed, neither branch spent.
    Locked,
    /// Spent via the preimage branch.
    Claimed,
    /// Spent via the timeout branch.
    Refunded,
    /// No such commitment.
    Unknown,
}

/// Result of an `htlc_status` poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtlcStatus {
    /// Current state.
    pub state: HtlcState,
    /// Committed amount (0 when unknown).
    pub amount: u64,
    /// Locktime in chain-native units (0 when unknown).
    pub locktime: u64,
    /// Confirmations of the lock transaction.
    pub confirmations: u64,
}

/// A fresh receiving address with its key metadata.
#[derive(Clone, Debug)]
pub struct NewAddress {
    /// The address string.
    pub address: String,
    /// Hash of the address's public key, for script construction.
    pub pubkey_hash: Hash160,
}

/// Result of a successful lock.
#[derive(Clone, Debug)]
pub struct LockOutcome {
    /// Transaction id of the lock.
    pub lock_tx_id: String,
    /// The redeem script (UTXO) or serialized program state key (account).
    pub script: Vec<u8>,
    /// The escrow address holding the commitment.
    pub escrow_address: String,
}

/// Narrowly scoped signing authorization for one operation.
///
/// Holds an opaque reference (a WIF string or equivalent); the connector
/// uses it for the single call and the memory is zeroized on drop.
/// Nothing here is ever persisted.
pub struct SigningMaterial(Zeroizing<String>);

impl SigningMaterial {
    /// Wrap a signing reference.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(Zeroizing::new(reference.into()))
    }

    /// Whether any material was supplied at all.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningMaterial(***)")
    }
}

/// Parameters for `lock_htlc`.
#[derive(Debug)]
pub struct LockHtlcParams {
    /// Amount to commit, in the chain's base units.
    pub amount: u64,
    /// The 20-byte hash-lock.
    pub hash_lock: Hash160,
    /// Recipient address (preimage branch).
    pub recipient: String,
    /// Refund address (timeout branch); also the funding source.
    pub refund_address: String,
    /// Absolute locktime in chain-native units.
    pub locktime: u64,
    /// Authorization to spend the funding address.
    pub signing: SigningMaterial,
}

/// Parameters for `claim_htlc`.
#[derive(Debug)]
pub struct ClaimHtlcParams {
    /// The lock transaction being spent.
    pub lock_tx_id: String,
    /// The redeem script returned by the lock.
    pub script: Vec<u8>,
    /// The preimage being revealed.
    pub secret: SwapSecret,
    /// Recipient address receiving the funds.
    pub recipient: String,
    /// Authorization for the recipient key.
    pub signing: SigningMaterial,
}

/// Parameters for `refund_htlc`.
#[derive(Debug)]
pub struct RefundHtlcParams {
    /// The lock transaction being spent.
    pub lock_tx_id: String,
    /// The redeem script returned by the lock.
    pub script: Vec<u8>,
    /// Refund address receiving the funds back.
    pub refund_address: String,
    /// Authorization for the refund key.
    pub signing: SigningMaterial,
}

/// Uniform capability surface every supported chain implements.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// Create a fresh receiving address.
    async fn new_address(&self) -> Result<NewAddress, ChainError>;

    /// Balance of an address. May be unconfirmed-inclusive; callers
    /// tolerate that.
    async fn balance_of(&self, address: &str) -> Result<u64, ChainError>;

    /// Publish a commitment spendable by the recipient on preimage
    /// reveal, or by the refund address after the locktime.
    async fn lock_htlc(&self, params: LockHtlcParams) -> Result<LockOutcome, ChainError>;

    /// Spend a commitment by revealing the preimage.
    async fn claim_htlc(&self, params: ClaimHtlcParams) -> Result<String, ChainError>;

    /// Spend a commitment via the timeout branch.
    async fn refund_htlc(&self, params: RefundHtlcParams) -> Result<String, ChainError>;

    /// Read-only poll of a commitment.
    async fn htlc_status(&self, lock_tx_id: &str) -> Result<HtlcStatus, ChainError>;

    /// The preimage revealed by a claim of this commitment, if any.
    /// This is public on-chain data; the taker's client uses it to claim
    /// the base leg after the maker claims the quote leg.
    async fn observed_secret(&self, lock_tx_id: &str) -> Result<Option<SwapSecret>, ChainError>;

    /// Logically block until `tx_id` is `depth` confirmations deep.
    async fn wait_for_confirmations(&self, tx_id: &str, depth: u64) -> Result<(), ChainError>;

    /// Chain identity.
    fn chain_meta(&self) -> ChainMeta;

    /// Confirmations this chain requires for finality.
    fn required_confirmations(&self) -> u64;

    /// Worst-case seconds for a transaction to reach finality. The
    /// coordinator uses this to validate the locktime margin.
    fn max_finality_secs(&self) -> u64;

    /// Convert a wall-clock unix time to this chain's locktime units.
    fn locktime_for(&self, unix_secs: u64) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_material_hidden_from_debug() {
        let material = SigningMaterial::new("wif:super-secret");
        let debug = format!("{material:?}");
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_signing_material_presence() {
        assert!(SigningMaterial::new("k").is_present());
        assert!(!SigningMaterial::new("").is_present());
    }
}
