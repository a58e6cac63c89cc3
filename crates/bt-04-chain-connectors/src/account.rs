//! The account quote-chain connector.
//!
//! The HTLC is a program instance keyed by `hash_lock`, with explicit
//! `lock`/`claim`/`refund` entry points and wall-clock locktimes. The
//! uniform trait addresses commitments by lock transaction id; an index
//! maps those back to the program key.

use crate::connector::{
    ChainConnector, ChainMeta, ClaimHtlcParams, HtlcState, HtlcStatus, LockHtlcParams,
    LockOutcome, NewAddress, RefundHtlcParams,
};
use crate::errors::ChainError;
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use shared_crypto::{hash_lock, sha256};
use shared_types::{Clock, Hash160, SwapSecret};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Chain parameters for an account connector instance.
#[derive(Clone, Debug)]
pub struct AccountProfile {
    /// Stable chain identifier.
    pub chain_id: String,
    /// Asset ticker.
    pub asset_ticker: String,
    /// Confirmations required for finality.
    pub required_confirmations: u64,
    /// Worst-case seconds to finality.
    pub finality_secs: u64,
}

impl Default for AccountProfile {
    fn default() -> Self {
        Self {
            chain_id: "acct-main".to_string(),
            asset_ticker: "USDQ".to_string(),
            required_confirmations: 12,
            finality_secs: 120,
        }
    }
}

struct AddressEntry {
    pubkey_hash: Hash160,
    balance: u64,
}

struct ProgramLock {
    amount: u64,
    receiver: String,
    refund_to: String,
    locktime: u64,
    state: HtlcState,
    lock_tx_id: String,
    revealed: Option<SwapSecret>,
}

#[derive(Default)]
struct AccountState {
    addresses: HashMap<String, AddressEntry>,
    locks: HashMap<Hash160, ProgramLock>,
    tx_index: HashMap<String, Hash160>,
    tx_times: HashMap<String, u64>,
    tx_counter: u64,
}

/// In-process account chain.
pub struct AccountConnector {
    profile: AccountProfile,
    clock: Arc<dyn Clock>,
    state: RwLock<AccountState>,
}

impl AccountConnector {
    /// Create a connector over the given clock.
    #[must_use]
    pub fn new(profile: AccountProfile, clock: Arc<dyn Clock>) -> Self {
        Self {
            profile,
            clock,
            state: RwLock::new(AccountState::default()),
        }
    }

    /// Credit an address. The external funding ledger's hook.
    pub fn credit(&self, address: &str, amount: u64) -> Result<(), ChainError> {
        let mut state = self.state.write();
        let entry = state
            .addresses
            .get_mut(address)
            .ok_or_else(|| ChainError::UnknownAddress(address.to_string()))?;
        entry.balance += amount;
        Ok(())
    }

    fn mint_tx_id(state: &mut AccountState, kind: &str, seed: &str) -> String {
        state.tx_counter += 1;
        let digest = sha256(format!("{kind}:{seed}:{}", state.tx_counter).as_bytes());
        hex::encode(digest)
    }
}

#[async_trait]
impl ChainConnector for AccountConnector {
    async fn new_address(&self) -> Result<NewAddress, ChainError> {
        let mut pkh_bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut pkh_bytes);
        let pubkey_hash = Hash160::new(pkh_bytes);
        let address = format!("0x{}", hex::encode(pubkey_hash.as_bytes()));

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

        if !state.addresses.contains_key(&params.recipient) {
            return Err(ChainError::UnknownAddress(params.recipient.clone()));
        }
        // One program instance per hash_lock.
        if state.locks.contains_key(&params.hash_lock) {
            return Err(ChainError::Rejected(format!(
                "lock already exists for hash_lock {}",
                params.hash_lock
            )));
        }

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

        let lock_tx_id = Self::mint_tx_id(&mut state, "lock", &params.hash_lock.to_string());
        let now = self.clock.unix_now();
        state.tx_times.insert(lock_tx_id.clone(), now);
        state.tx_index.insert(lock_tx_id.clone(), params.hash_lock);
        state.locks.insert(
            params.hash_lock,
            ProgramLock {
                amount: params.amount,
                receiver: params.recipient.clone(),
                refund_to: params.refund_address.clone(),
                locktime: params.locktime,
                state: HtlcState::Locked,
                lock_tx_id: lock_tx_id.clone(),
                revealed: None,
            },
        );

        info!(
            chain = %self.profile.chain_id,
            tx = %lock_tx_id,
            hash_lock = %params.hash_lock,
            amount = params.amount,
            locktime = params.locktime,
            "HTLC program instance locked"
        );
        Ok(LockOutcome {
            lock_tx_id,
            // The program key doubles as the script handle.
            script: params.hash_lock.as_bytes().to_vec(),
            escrow_address: format!("htlc:{}", params.hash_lock),
        })
    }

    async fn claim_htlc(&self, params: ClaimHtlcParams) -> Result<String, ChainError> {
        if !params.signing.is_present() {
            return Err(ChainError::Rejected("missing signing material".into()));
        }

        let mut state = self.state.write();

        let key = *state
            .tx_index
            .get(&params.lock_tx_id)
            .ok_or_else(|| ChainError::HtlcNotFound(params.lock_tx_id.clone()))?;
        let lock = state
            .locks
            .get_mut(&key)
            .ok_or_else(|| ChainError::HtlcNotFound(params.lock_tx_id.clone()))?;

        if lock.state != HtlcState::Locked {
            return Err(ChainError::AlreadySpent(params.lock_tx_id.clone()));
        }
        if hash_lock(&params.secret) != key {
            return Err(ChainError::InvalidSecret);
        }
        if lock.receiver != params.recipient {
            return Err(ChainError::WrongBranchKey(params.recipient.clone()));
        }

        lock.state = HtlcState::Claimed;
        lock.revealed = Some(params.secret.clone());
        let amount = lock.amount;
        let receiver = lock.receiver.clone();

        if let Some(entry) = state.addresses.get_mut(&receiver) {
            entry.balance += amount;
        }
        let claim_tx_id = Self::mint_tx_id(&mut state, "claim", &key.to_string());
        let now = self.clock.unix_now();
        state.tx_times.insert(claim_tx_id.clone(), now);
        state.tx_index.insert(claim_tx_id.clone(), key);

        info!(
            chain = %self.profile.chain_id,
            tx = %claim_tx_id,
            hash_lock = %key,
            "HTLC claim(secret) executed, preimage now public"
        );
        Ok(claim_tx_id)
    }

    async fn refund_htlc(&self, params: RefundHtlcParams) -> Result<String, ChainError> {
        if !params.signing.is_present() {
            return Err(ChainError::Rejected("missing signing material".into()));
        }

        let mut state = self.state.write();

        let key = *state
            .tx_index
            .get(&params.lock_tx_id)
            .ok_or_else(|| ChainError::HtlcNotFound(params.lock_tx_id.clone()))?;
        let lock = state
            .locks
            .get_mut(&key)
            .ok_or_else(|| ChainError::HtlcNotFound(params.lock_tx_id.clone()))?;

        if lock.state != HtlcState::Locked {
            return Err(ChainError::AlreadySpent(params.lock_tx_id.clone()));
        }
        let now = self.clock.unix_now();
        if now < lock.locktime {
            return Err(ChainError::LocktimeNotReached {
                now,
                locktime: lock.locktime,
            });
        }
        if lock.refund_to != params.refund_address {
            return Err(ChainError::WrongBranchKey(params.refund_address.clone()));
        }

        lock.state = HtlcState::Refunded;
        let amount = lock.amount;
        let refund_to = lock.refund_to.clone();

        if let Some(entry) = state.addresses.get_mut(&refund_to) {
            entry.balance += amount;
        }
        let refund_tx_id = Self::mint_tx_id(&mut state, "refund", &key.to_string());
        state.tx_times.insert(refund_tx_id.clone(), now);
        state.tx_index.insert(refund_tx_id.clone(), key);

        info!(
            chain = %self.profile.chain_id,
            tx = %refund_tx_id,
            hash_lock = %key,
            "HTLC refund() executed"
        );
        Ok(refund_tx_id)
    }

    async fn htlc_status(&self, lock_tx_id: &str) -> Result<HtlcStatus, ChainError> {
        let state = self.state.read();
        let Some(lock) = state
            .tx_index
            .get(lock_tx_id)
            .and_then(|key| state.locks.get(key))
        else {
            return Ok(HtlcStatus {
                state: HtlcState::Unknown,
                amount: 0,
                locktime: 0,
                confirmations: 0,
            });
        };
        // Account-chain confirmations approximate by elapsed time.
        let confirmations = state
            .tx_times
            .get(&lock.lock_tx_id)
            .map(|t| {
                let elapsed = self.clock.unix_now().saturating_sub(*t);
                elapsed * self.profile.required_confirmations / self.profile.finality_secs + 1
            })
            .unwrap_or(0);
        Ok(HtlcStatus {
            state: lock.state,
            amount: lock.amount,
            locktime: lock.locktime,
            confirmations,
        })
    }

    async fn observed_secret(&self, lock_tx_id: &str) -> Result<Option<SwapSecret>, ChainError> {
        let state = self.state.read();
        Ok(state
            .tx_index
            .get(lock_tx_id)
            .and_then(|key| state.locks.get(key))
            .and_then(|lock| lock.revealed.clone()))
    }

    async fn wait_for_confirmations(&self, tx_id: &str, depth: u64) -> Result<(), ChainError> {
        loop {
            let deep_enough = {
                let state = self.state.read();
                match state.tx_times.get(tx_id) {
                    Some(submitted) => {
                        let elapsed = self.clock.unix_now().saturating_sub(*submitted);
                        elapsed * self.profile.required_confirmations / self.profile.finality_secs
                            + 1
                            >= depth
                    }
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
        self.profile.finality_secs
    }

    fn locktime_for(&self, unix_secs: u64) -> u64 {
        unix_secs
    }
}
