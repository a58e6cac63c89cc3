//! The UTXO base-chain connector.
//!
//! A deterministic in-process chain with script-faithful HTLCs. Block
//! height advances with the injected clock, so tests cross locktimes by
//! advancing a [`shared_types::ManualClock`].

use crate::connector::{
    ChainConnector, ChainMeta, ClaimHtlcParams, HtlcState, HtlcStatus, LockHtlcParams,
    LockOutcome, NewAddress, RefundHtlcParams,
};
use crate::errors::ChainError;
use crate::script::{base58check, htlc_redeem_script, p2sh_address};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use shared_crypto::{hash_lock, sha256};
use shared_types::{Clock, Hash160, SwapSecret};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Chain parameters for a UTXO connector instance.
#[derive(Clone, Debug)]
pub struct UtxoProfile {
    /// Stable chain identifier.
    pub chain_id: String,
    /// Asset ticker.
    pub asset_ticker: String,
    /// Seconds per block.
    pub block_interval_secs: u64,
    /// Unix time of height zero.
    pub genesis_time: u64,
    /// Version byte for P2SH escrow addresses.
    pub p2sh_version: u8,
    /// Version byte for P2PKH receiving addresses.
    pub p2pkh_version: u8,
    /// Confirmations required for finality.
    pub required_confirmations: u64,
}

impl Default for UtxoProfile {
    fn default() -> Self {
        Self {
            chain_id: "utxo-base".to_string(),
            asset_ticker: "ZEC".to_string(),
            block_interval_secs: 150,
            genesis_time: 1_700_000_000,
            p2sh_version: 0x05,
            p2pkh_version: 0x00,
            required_confirmations: 6,
        }
    }
}

struct AddressEntry {
    pubkey_hash: Hash160,
    balance: u64,
}

struct UtxoHtlc {
    script: Vec<u8>,
    hash_lock: Hash160,
    recipient_pkh: Hash160,
    refund_pkh: Hash160,
    amount: u64,
    locktime_height: u64,
    escrow_address: String,
    state: HtlcState,
    revealed: Option<SwapSecret>,
}

#[derive(Default)]
struct UtxoState {
    addresses: HashMap<String, AddressEntry>,
    htlcs: HashMap<String, UtxoHtlc>,
    tx_heights: HashMap<String, u64>,
    tx_counter: u64,
}

/// In-process UTXO chain.
pub struct UtxoConnector {
    profile: UtxoProfile,
    clock: Arc<dyn Clock>,
    state: RwLock<UtxoState>,
}

impl UtxoConnector {
    /// Create a connector over the given clock.
    #[must_use]
    pub fn new(profile: UtxoProfile, clock: Arc<dyn Clock>) -> Self {
        Self {
            profile,
            clock,
            state: RwLock::new(UtxoState::default()),
        }
    }

    /// Current block height.
    #[must_use]
    pub fn height(&self) -> u64 {
        let now = self.clock.unix_now();
        now.saturating_sub(self.profile.genesis_time) / self.profile.block_interval_secs
    }

    /// Credit an address. Funding wallets is the external ledger's job;
    /// this is the hook it (and the tests) use.
    pub fn credit(&self, address: &str, amount: u64) -> Result<(), ChainError> {
        let mut state = self.state.write();
        let entry = state
            .addresses
            .get_mut(address)
            .ok_or_else(|| ChainError::UnknownAddress(address.to_string()))?;
        entry.balance += amount;
        Ok(())
    }

    fn mint_tx_id(state: &mut UtxoState, kind: &str, seed: &str) -> String {
        state.tx_counter += 1;
        let digest = sha256(format!("{kind}:{seed}:{}", state.tx_counter).as_bytes());
        hex::encode(digest)
    }
}

#[async_trait]
impl ChainConnector for UtxoConnector {
    async fn new_address(&self) -> Result<NewAddress, ChainError> {
        let mut pkh_bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut pkh_bytes);
        let pubkey_hash = Hash160::new(pkh_bytes);
        let address = base58check(self.profile.p2pkh_version, pubkey_hash.as_bytes());

        self.state.write().addresses.insert(
            address.clone(),
            AddressEntry {
                pubkey_hash,
                balance: 0,
            },
        );
        debug!(chain = %self.profile.chain_id, address = %address, "new address");
        Ok(NewAddress {
            address,
            pubkey_hash,
        })
    }

    async fn balance_of(&self, address: &str) -> Result<u64, ChainError> {
        self.state
            .read()
            .addresses
            .get(address)
            .map(|e| e.balance)
            .ok_or_else(|| ChainError::UnknownAddress(address.to_string()))
    }

    async fn lock_htlc(&self, params: LockHtlcParams) -> Result<LockOutcome, ChainError> {
        if !params.signing.is_present() {
            return Err(ChainError::Rejected("missing signing material".into()));
        }

        let mut state = self.state.write();

        let recipient_pkh = state
            .addresses
            .get(&params.recipient)
            .map(|e| e.pubkey_hash)
            .ok_or_else(|| ChainError::UnknownAddress(params.recipient.clone()))?;

        let funder = state
            .addresses
            .get_mut(&params.refund_address)
            .ok_or_else(|| ChainError::UnknownAddress(params.refund_address.clone()))?;
        if funder.balance < params.amount {
            return Err(ChainError::InsufficientFunds {
                have: funder.balance,
                need: params.amount,
            });
        }
        funder.balance -= params.amount;
        let refund_pkh = funder.pubkey_hash;

        let script = htlc_redeem_script(
            &params.hash_lock,
            &recipient_pkh,
            &refund_pkh,
            params.locktime,
        );
        let escrow_address = p2sh_address(&script, self.profile.p2sh_version);
        let lock_tx_id = Self::mint_tx_id(&mut state, "lock", &escrow_address);

        let height = self.height();
        state.tx_heights.insert(lock_tx_id.clone(), height);
        state.htlcs.insert(
            lock_tx_id.clone(),
            UtxoHtlc {
                script: script.clone(),
                hash_lock: params.hash_lock,
                recipient_pkh,
                refund_pkh,
                amount: params.amount,
                locktime_height: params.locktime,
                escrow_address: escrow_address.clone(),
                state: HtlcState::Locked,
                revealed: None,
            },
        );

        info!(
            chain = %self.profile.chain_id,
            tx = %lock_tx_id,
            escrow = %escrow_address,
            amount = params.amount,
            locktime = params.locktime,
            "HTLC locked"
        );
        Ok(LockOutcome {
            lock_tx_id,
            script,
            escrow_address,
        })
    }

    async fn claim_htlc(&self, params: ClaimHtlcParams) -> Result<String, ChainError> {
        if !params.signing.is_present() {
            return Err(ChainError::Rejected("missing signing material".into()));
        }

        let mut state = self.state.write();

        let recipient_pkh = state
            .addresses
            .get(&params.recipient)
            .map(|e| e.pubkey_hash)
            .ok_or_else(|| ChainError::UnknownAddress(params.recipient.clone()))?;

        let htlc = state
            .htlcs
            .get_mut(&params.lock_tx_id)
            .ok_or_else(|| ChainError::HtlcNotFound(params.lock_tx_id.clone()))?;
        if htlc.state != HtlcState::Locked {
            return Err(ChainError::AlreadySpent(params.lock_tx_id.clone()));
        }
        // The preimage branch: RIPEMD160(SHA256(secret)) must equal H.
        if hash_lock(&params.secret) != htlc.hash_lock {
            return Err(ChainError::InvalidSecret);
        }
        if recipient_pkh != htlc.recipient_pkh {
            return Err(ChainError::WrongBranchKey(params.recipient.clone()));
        }

        htlc.state = HtlcState::Claimed;
        htlc.revealed = Some(params.secret.clone());
        let amount = htlc.amount;
        let escrow = htlc.escrow_address.clone();

        if let Some(entry) = state.addresses.get_mut(&params.recipient) {
            entry.balance += amount;
        }
        let claim_tx_id = Self::mint_tx_id(&mut state, "claim", &escrow);
        let height = self.height();
        state.tx_heights.insert(claim_tx_id.clone(), height);

        info!(
            chain = %self.profile.chain_id,
            tx = %claim_tx_id,
            lock_tx = %params.lock_tx_id,
            "HTLC claimed, preimage now public"
        );
        Ok(claim_tx_id)
    }

    async fn refund_htlc(&self, params: RefundHtlcParams) -> Result<String, ChainError> {
        if !params.signing.is_present() {
            return Err(ChainError::Rejected("missing signing material".into()));
        }

        let mut state = self.state.write();

        let refund_pkh = state
            .addresses
            .get(&params.refund_address)
            .map(|e| e.pubkey_hash)
            .ok_or_else(|| ChainError::UnknownAddress(params.refund_address.clone()))?;

        let htlc = state
            .htlcs
            .get_mut(&params.lock_tx_id)
            .ok_or_else(|| ChainError::HtlcNotFound(params.lock_tx_id.clone()))?;
        if htlc.state != HtlcState::Locked {
            return Err(ChainError::AlreadySpent(params.lock_tx_id.clone()));
        }
        let height = self.height();
        if height < htlc.locktime_height {
            return Err(ChainError::LocktimeNotReached {
                now: height,
                locktime: htlc.locktime_height,
            });
        }
        if refund_pkh != htlc.refund_pkh {
            return Err(ChainError::WrongBranchKey(params.refund_address.clone()));
        }

        htlc.state = HtlcState::Refunded;
        let amount = htlc.amount;
        let escrow = htlc.escrow_address.clone();

        if let Some(entry) = state.addresses.get_mut(&params.refund_address) {
            entry.balance += amount;
        }
        let refund_tx_id = Self::mint_tx_id(&mut state, "refund", &escrow);
        state.tx_heights.insert(refund_tx_id.clone(), height);

        info!(
            chain = %self.profile.chain_id,
            tx = %refund_tx_id,
            lock_tx = %params.lock_tx_id,
            "HTLC refunded via timeout branch"
        );
        Ok(refund_tx_id)
    }

    async fn htlc_status(&self, lock_tx_id: &str) -> Result<HtlcStatus, ChainError> {
        let state = self.state.read();
        let Some(htlc) = state.htlcs.get(lock_tx_id) else {
            return Ok(HtlcStatus {
                state: HtlcState::Unknown,
                amount: 0,
                locktime: 0,
                confirmations: 0,
            });
        };
        let confirmations = state
            .tx_heights
            .get(lock_tx_id)
            .map(|h| self.height().saturating_sub(*h) + 1)
            .unwrap_or(0);
        Ok(HtlcStatus {
            state: htlc.state,
            amount: htlc.amount,
            locktime: htlc.locktime_height,
            confirmations,
        })
    }

    async fn observed_secret(&self, lock_tx_id: &str) -> Result<Option<SwapSecret>, ChainError> {
        Ok(self
            .state
            .read()
            .htlcs
            .get(lock_tx_id)
            .and_then(|h| h.revealed.clone()))
    }

    async fn wait_for_confirmations(&self, tx_id: &str, depth: u64) -> Result<(), ChainError> {
        loop {
            let deep_enough = {
                let state = self.state.read();
                match state.tx_heights.get(tx_id) {
                    Some(included) => self.height().saturating_sub(*included) + 1 >= depth,
                    None => return Err(ChainError::HtlcNotFound(tx_id.to_string())),
                }
            };
            if deep_enough {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    fn chain_meta(&self) -> ChainMeta {
        ChainMeta {
            chain_id: self.profile.chain_id.clone(),
            asset_ticker: self.profile.asset_ticker.clone(),
        }
    }

    fn required_confirmations(&self) -> u64 {
        self.profile.required_confirmations
    }

    fn max_finality_secs(&self) -> u64 {
        self.profile.required_confirmations * self.profile.block_interval_secs
    }

    fn locktime_for(&self, unix_secs: u64) -> u64 {
        unix_secs.saturating_sub(self.profile.genesis_time) / self.profile.block_interval_secs
    }
}
