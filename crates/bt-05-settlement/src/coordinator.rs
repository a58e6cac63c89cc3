//! The coordinator task.

use crate::config::SettlementConfig;
use crate::errors::SettlementError;
use crate::record::SwapRecord;
use bt_04_chain_connectors::{ConnectorRegistry, HtlcState};
use shared_bus::{BusMessage, BusPublisher, SeenCache, SettlementBus};
use shared_crypto::hash_lock;
use shared_types::{
    Clock, Hash160, HtlcParams, NoticeKind, ProposalId, SecretReveal, SettlementNotice,
    SettlementPayload, SettlementRequest, SettlementStatus, StatusUpdate, SwapParty,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Command channel depth.
const COMMAND_BUFFER: usize = 32;

/// Read-only view of a swap record, without the preimage.
#[derive(Clone, Debug)]
pub struct SwapSnapshot {
    /// The proposal being settled.
    pub proposal_id: ProposalId,
    /// Current settlement status.
    pub status: SettlementStatus,
    /// The advertised hash-lock.
    pub hash_lock: Hash160,
    /// Base-chain lock transaction, once observed.
    pub base_lock_tx: Option<String>,
    /// Quote-chain lock transaction, once observed.
    pub quote_lock_tx: Option<String>,
    /// Base-chain refund locktime, unix seconds.
    pub base_locktime: u64,
    /// Quote-chain refund locktime, unix seconds.
    pub quote_locktime: u64,
    /// Whether the preimage has been published.
    pub secret_published: bool,
    /// Ingest time.
    pub created_at: u64,
    /// Last transition time.
    pub updated_at: u64,
}

impl SwapSnapshot {
    fn of(swap: &SwapRecord) -> Self {
        Self {
            proposal_id: swap.proposal_id.clone(),
            status: swap.status,
            hash_lock: swap.hash_lock,
            base_lock_tx: swap.base_lock_tx.clone(),
            quote_lock_tx: swap.quote_lock_tx.clone(),
            base_locktime: swap.base_locktime,
            quote_locktime: swap.quote_locktime,
            secret_published: swap.secret_published,
            created_at: swap.created_at,
            updated_at: swap.updated_at,
        }
    }
}

enum CoordinatorCommand {
    Snapshot {
        proposal_id: ProposalId,
        reply: oneshot::Sender<Option<SwapSnapshot>>,
    },
    ListActive {
        reply: oneshot::Sender<Vec<SwapSnapshot>>,
    },
}

/// Query handle into the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Snapshot one swap.
    pub async fn snapshot(
        &self,
        proposal_id: ProposalId,
    ) -> Result<Option<SwapSnapshot>, SettlementError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorCommand::Snapshot { proposal_id, reply })
            .await
            .map_err(|_| SettlementError::ChannelClosed)?;
        rx.await.map_err(|_| SettlementError::ChannelClosed)
    }

    /// Snapshot every non-terminal swap.
    pub async fn list_active(&self) -> Result<Vec<SwapSnapshot>, SettlementError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorCommand::ListActive { reply })
            .await
            .map_err(|_| SettlementError::ChannelClosed)?;
        rx.await.map_err(|_| SettlementError::ChannelClosed)
    }
}

/// The settlement coordinator. Owns the swap table.
pub struct Coordinator {
    bus: Arc<SettlementBus>,
    registry: Arc<ConnectorRegistry>,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
    swaps: HashMap<ProposalId, SwapRecord>,
    seen: SeenCache,
    last_poll_at: u64,
    command_rx: mpsc::Receiver<CoordinatorCommand>,
}

impl Coordinator {
    /// Build the coordinator and its query handle.
    #[must_use]
    pub fn new(
        bus: Arc<SettlementBus>,
        registry: Arc<ConnectorRegistry>,
        clock: Arc<dyn Clock>,
        config: SettlementConfig,
    ) -> (Self, CoordinatorHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        (
            Self {
                bus,
                registry,
                clock,
                config,
                swaps: HashMap::new(),
                seen: SeenCache::new(),
                last_poll_at: 0,
                command_rx,
            },
            CoordinatorHandle { command_tx },
        )
    }

    /// Drive the coordinator until shutdown. Run in a dedicated task.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut requests = self.bus.subscribe("settlement.request.*");
        let mut statuses = self.bus.subscribe("settlement.status.*");
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(10)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // After a (re)start every active proposal's state goes back on
        // the wire so late or partitioned subscribers converge.
        self.republish_active().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("settlement coordinator shutting down");
                        return;
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("all coordinator handles dropped, stopping");
                            return;
                        }
                    }
                }

                message = requests.recv() => {
                    if let Some(message) = message {
                        self.on_request(message).await;
                    }
                }

                message = statuses.recv() => {
                    if let Some(message) = message {
                        self.on_status(message).await;
                    }
                }

                _ = tick.tick() => {
                    self.on_tick().await;
                }
            }
        }
    }

    fn handle_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Snapshot { proposal_id, reply } => {
                let _ = reply.send(self.swaps.get(&proposal_id).map(SwapSnapshot::of));
            }
            CoordinatorCommand::ListActive { reply } => {
                let _ = reply.send(
                    self.swaps
                        .values()
                        .filter(|s| !s.status.is_terminal())
                        .map(SwapSnapshot::of)
                        .collect(),
                );
            }
        }
    }

    async fn publish(&self, payload: SettlementPayload) {
        self.bus.publish(payload, self.clock.unix_now()).await;
    }

    /// Republish hash-lock parameters and current status for every
    /// active swap.
    async fn republish_active(&self) {
        let mut payloads = Vec::new();
        for swap in self.swaps.values().filter(|s| !s.status.is_terminal()) {
            payloads.push(SettlementPayload::Htlc(HtlcParams {
                proposal_id: swap.proposal_id.clone(),
                hash_lock: swap.hash_lock,
                base_locktime: swap.base_locktime,
                quote_locktime: swap.quote_locktime,
            }));
            payloads.push(SettlementPayload::Status(StatusUpdate {
                proposal_id: swap.proposal_id.clone(),
                target: swap.status,
                party: SwapParty::Maker,
                tx_id: swap.base_lock_tx.clone(),
                escrow_address: swap.base_escrow_address.clone(),
                pubkey_hash: None,
                funding_address: None,
            }));
        }
        for payload in payloads {
            self.publish(payload).await;
        }
    }

    // =========================================================================
    // Request ingest
    // =========================================================================

    async fn on_request(&mut self, message: BusMessage) {
        let now = self.clock.unix_now();
        if !self.seen.first_sighting(message.message_id, now) {
            return;
        }
        let SettlementPayload::Request(request) = message.payload else {
            return;
        };

        if self.swaps.contains_key(&request.proposal_id) {
            // Redelivery of an ingested request: re-advertise and stop.
            if let Some(swap) = self.swaps.get(&request.proposal_id) {
                let params = SettlementPayload::Htlc(HtlcParams {
                    proposal_id: swap.proposal_id.clone(),
                    hash_lock: swap.hash_lock,
                    base_locktime: swap.base_locktime,
                    quote_locktime: swap.quote_locktime,
                });
                self.publish(params).await;
            }
            return;
        }

        match self.ingest_request(request, now) {
            Ok(proposal_id) => {
                let swap = &self.swaps[&proposal_id];
                let htlc = SettlementPayload::Htlc(HtlcParams {
                    proposal_id: proposal_id.clone(),
                    hash_lock: swap.hash_lock,
                    base_locktime: swap.base_locktime,
                    quote_locktime: swap.quote_locktime,
                });
                let ready = SettlementPayload::Status(StatusUpdate {
                    proposal_id,
                    target: SettlementStatus::Ready,
                    party: SwapParty::Maker,
                    tx_id: None,
                    escrow_address: None,
                    pubkey_hash: None,
                    funding_address: None,
                });
                self.publish(htlc).await;
                self.publish(ready).await;
            }
            Err(e) => warn!(error = %e, "settlement request rejected"),
        }
    }

    fn ingest_request(
        &mut self,
        request: SettlementRequest,
        now: u64,
    ) -> Result<ProposalId, SettlementError> {
        let base = self.registry.base();
        let quote = self.registry.by_tag(&request.chain_tag)?;

        let base_locktime = now + self.config.base_locktime_secs;
        let quote_locktime = now + self.config.quote_locktime_secs;

        // T_Q must undercut T_B by both chains' worst-case finality.
        let required_margin = base.max_finality_secs() + quote.max_finality_secs();
        if quote_locktime + required_margin >= base_locktime {
            return Err(SettlementError::InvalidLocktimeMargin {
                quote_locktime,
                base_locktime,
                required_margin,
            });
        }

        let lock = hash_lock(&request.secret);
        info!(
            proposal_id = %request.proposal_id,
            hash_lock = %lock,
            base_locktime,
            quote_locktime,
            "settlement request ingested"
        );

        let proposal_id = request.proposal_id.clone();
        self.swaps.insert(
            proposal_id.clone(),
            SwapRecord::new(
                request.proposal_id,
                request.order_id,
                request.maker_peer,
                request.taker_peer,
                request.base_amount,
                request.quote_amount,
                request.chain_tag,
                request.secret,
                lock,
                base_locktime,
                quote_locktime,
                now,
            ),
        );
        Ok(proposal_id)
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    async fn on_status(&mut self, message: BusMessage) {
        let now = self.clock.unix_now();
        if !self.seen.first_sighting(message.message_id, now) {
            return;
        }
        let SettlementPayload::Status(update) = message.payload else {
            // Notices share the status subject; nothing to do with ours.
            return;
        };

        let Some(swap) = self.swaps.get_mut(&update.proposal_id) else {
            debug!(proposal_id = %update.proposal_id, "status for unknown swap ignored");
            return;
        };

        // Stash per-party script data and on-chain references before the
        // transition; replays overwrite with identical values.
        match update.party {
            SwapParty::Maker => {
                if update.pubkey_hash.is_some() {
                    swap.maker_pubkey_hash = update.pubkey_hash;
                }
            }
            SwapParty::Taker => {
                if update.pubkey_hash.is_some() {
                    swap.taker_pubkey_hash = update.pubkey_hash;
                }
            }
        }
        match update.target {
            SettlementStatus::MakerLocked => {
                if update.tx_id.is_some() {
                    swap.base_lock_tx = update.tx_id.clone();
                }
                if update.escrow_address.is_some() {
                    swap.base_escrow_address = update.escrow_address.clone();
                }
            }
            SettlementStatus::TakerLocked => {
                if update.tx_id.is_some() {
                    swap.quote_lock_tx = update.tx_id.clone();
                }
            }
            _ => {}
        }

        let applied = match swap.apply_status(update.target, now) {
            Ok(applied) => applied,
            Err(e) => {
                debug!(proposal_id = %update.proposal_id, error = %e, "status not applied");
                return;
            }
        };
        if !applied {
            return; // idempotent replay; do not re-publish
        }
        info!(
            proposal_id = %update.proposal_id,
            status = ?update.target,
            "settlement transition"
        );

        let mut followups = Vec::new();
        followups.push(SettlementPayload::Status(update.clone()));

        // Second lock in: both_locked, and the reveal moment arrives.
        if matches!(
            update.target,
            SettlementStatus::MakerLocked | SettlementStatus::TakerLocked
        ) && swap.both_locks_observed()
        {
            if let Ok(true) = swap.apply_status(SettlementStatus::BothLocked, now) {
                info!(proposal_id = %update.proposal_id, "both legs locked");
                followups.push(SettlementPayload::Status(StatusUpdate {
                    proposal_id: update.proposal_id.clone(),
                    target: SettlementStatus::BothLocked,
                    party: update.party,
                    tx_id: None,
                    escrow_address: None,
                    pubkey_hash: None,
                    funding_address: None,
                }));
                followups.push(Self::reveal_secret(swap, &self.config, now));
            }
        }

        // Base claim completes the swap.
        if update.target == SettlementStatus::BaseClaimed {
            if let Ok(true) = swap.apply_status(SettlementStatus::Complete, now) {
                info!(proposal_id = %update.proposal_id, "swap complete");
                followups.push(SettlementPayload::Status(StatusUpdate {
                    proposal_id: update.proposal_id.clone(),
                    target: SettlementStatus::Complete,
                    party: update.party,
                    tx_id: update.tx_id.clone(),
                    escrow_address: None,
                    pubkey_hash: None,
                    funding_address: None,
                }));
            }
        }

        for payload in followups {
            self.publish(payload).await;
        }
    }

    /// First publication of the preimage; schedules the re-emission
    /// backoff. Callable only once `both_locked` is recorded.
    fn reveal_secret(
        swap: &mut SwapRecord,
        config: &SettlementConfig,
        now: u64,
    ) -> SettlementPayload {
        swap.secret_published = true;
        swap.secret_reemit_backoff = config.secret_reemit_base_secs;
        swap.secret_reemit_at = Some(now + config.secret_reemit_base_secs);
        SettlementPayload::Secret(SecretReveal {
            proposal_id: swap.proposal_id.clone(),
            secret: swap.secret().clone(),
        })
    }

    // =========================================================================
    // Watcher tick: timeouts, re-emission, reconciliation, retention
    // =========================================================================

    async fn on_tick(&mut self) {
        let now = self.clock.unix_now();
        let mut payloads = Vec::new();

        for swap in self.swaps.values_mut() {
            if swap.status.is_terminal() {
                continue;
            }

            // Timeout notices, throttled per swap.
            if now.saturating_sub(swap.last_notice_at) >= self.config.notice_interval_secs {
                let notices = Self::timeout_notices(swap, now);
                if !notices.is_empty() {
                    swap.last_notice_at = now;
                    payloads.extend(notices.into_iter().map(SettlementPayload::Notice));
                }
            }

            // Secret re-emission with exponential backoff, stopping at T_B.
            if swap.secret_published && now < swap.base_locktime {
                if let Some(reemit_at) = swap.secret_reemit_at {
                    if now >= reemit_at {
                        payloads.push(SettlementPayload::Secret(SecretReveal {
                            proposal_id: swap.proposal_id.clone(),
                            secret: swap.secret().clone(),
                        }));
                        swap.secret_reemit_backoff = (swap.secret_reemit_backoff * 2)
                            .min(self.config.secret_reemit_cap_secs);
                        swap.secret_reemit_at = Some(now + swap.secret_reemit_backoff);
                    }
                }
            } else if swap.secret_reemit_at.is_some() && now >= swap.base_locktime {
                swap.secret_reemit_at = None;
            }
        }

        if now.saturating_sub(self.last_poll_at) >= self.config.poll_interval_secs {
            self.last_poll_at = now;
            let reconciled = self.reconcile(now).await;
            payloads.extend(reconciled);
        }

        // Retention: drop terminal records past the observability window.
        let retention = self.config.retention_secs;
        self.swaps.retain(|proposal_id, swap| {
            let keep = match swap.terminal_at {
                Some(at) => now.saturating_sub(at) <= retention,
                None => true,
            };
            if !keep {
                debug!(proposal_id = %proposal_id, "terminal swap collected");
            }
            keep
        });

        for payload in payloads {
            self.publish(payload).await;
        }
    }

    fn timeout_notices(swap: &SwapRecord, now: u64) -> Vec<SettlementNotice> {
        let mut notices = Vec::new();
        let proposal_id = swap.proposal_id.clone();
        let quote_expired = now > swap.quote_locktime;

        match swap.status {
            SettlementStatus::MakerLocked if quote_expired => {
                notices.push(SettlementNotice {
                    proposal_id,
                    kind: NoticeKind::RefundReady(SwapParty::Maker),
                });
            }
            SettlementStatus::TakerLocked if quote_expired => {
                notices.push(SettlementNotice {
                    proposal_id,
                    kind: NoticeKind::RefundReady(SwapParty::Taker),
                });
            }
            SettlementStatus::BothLocked if quote_expired => {
                notices.push(SettlementNotice {
                    proposal_id: proposal_id.clone(),
                    kind: NoticeKind::RefundReady(SwapParty::Maker),
                });
                notices.push(SettlementNotice {
                    proposal_id,
                    kind: NoticeKind::RefundReady(SwapParty::Taker),
                });
            }
            // The preimage is public from the quote claim on; keep
            // telling the taker until the base leg resolves.
            SettlementStatus::QuoteClaimed => {
                notices.push(SettlementNotice {
                    proposal_id,
                    kind: NoticeKind::SecretAvailable(SwapParty::Taker),
                });
            }
            _ => {}
        }
        notices
    }

    /// Poll connectors for the transactions we know about and fold
    /// on-chain reality back into the records.
    async fn reconcile(&mut self, now: u64) -> Vec<SettlementPayload> {
        struct Probe {
            proposal_id: ProposalId,
            base_tx: Option<String>,
            quote_tx: Option<String>,
            chain_tag: String,
        }

        let probes: Vec<Probe> = self
            .swaps
            .values()
            .filter(|s| !s.status.is_terminal())
            .filter(|s| s.base_lock_tx.is_some() || s.quote_lock_tx.is_some())
            .map(|s| Probe {
                proposal_id: s.proposal_id.clone(),
                base_tx: s.base_lock_tx.clone(),
                quote_tx: s.quote_lock_tx.clone(),
                chain_tag: s.chain_tag.clone(),
            })
            .collect();

        let mut payloads = Vec::new();
        for probe in probes {
            let base_state = match &probe.base_tx {
                Some(tx) => match self.registry.base().htlc_status(tx).await {
                    Ok(status) => Some(status.state),
                    Err(e) => {
                        debug!(proposal_id = %probe.proposal_id, error = %e, "base poll failed");
                        None
                    }
                },
                None => None,
            };
            let quote_state = match (&probe.quote_tx, self.registry.by_tag(&probe.chain_tag)) {
                (Some(tx), Ok(quote)) => match quote.htlc_status(tx).await {
                    Ok(status) => Some(status.state),
                    Err(e) => {
                        debug!(proposal_id = %probe.proposal_id, error = %e, "quote poll failed");
                        None
                    }
                },
                _ => None,
            };

            let Some(swap) = self.swaps.get_mut(&probe.proposal_id) else {
                continue;
            };
            for target in reconcile_targets(swap.status, base_state, quote_state) {
                match swap.apply_status(target, now) {
                    Ok(true) => {
                        info!(
                            proposal_id = %swap.proposal_id,
                            status = ?target,
                            "reconciled from on-chain state"
                        );
                        payloads.push(SettlementPayload::Status(StatusUpdate {
                            proposal_id: swap.proposal_id.clone(),
                            target,
                            party: SwapParty::Maker,
                            tx_id: None,
                            escrow_address: None,
                            pubkey_hash: None,
                            funding_address: None,
                        }));
                        if target == SettlementStatus::BothLocked && !swap.secret_published {
                            payloads.push(Self::reveal_secret(swap, &self.config, now));
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        debug!(proposal_id = %swap.proposal_id, error = %e, "reconcile skipped")
                    }
                }
            }
        }
        payloads
    }
}

/// The forward transitions implied by observed on-chain states.
fn reconcile_targets(
    current: SettlementStatus,
    base: Option<HtlcState>,
    quote: Option<HtlcState>,
) -> Vec<SettlementStatus> {
    use SettlementStatus as S;
    let mut targets = Vec::new();

    // Refunds first: a confirmed timeout-branch spend is terminal.
    match (base, quote) {
        (Some(HtlcState::Refunded), Some(HtlcState::Refunded)) => return vec![S::RefundedBoth],
        (Some(HtlcState::Refunded), _) if current == S::MakerLocked || current == S::QuoteClaimed => {
            return vec![S::RefundedMaker];
        }
        (_, Some(HtlcState::Refunded)) if current == S::TakerLocked => {
            return vec![S::RefundedTaker];
        }
        _ => {}
    }

    // Claims walk the happy path forward.
    if quote == Some(HtlcState::Claimed) {
        match current {
            S::BothLocked => targets.push(S::QuoteClaimed),
            S::MakerLocked | S::TakerLocked => {
                targets.push(S::BothLocked);
                targets.push(S::QuoteClaimed);
            }
            _ => {}
        }
    }
    if base == Some(HtlcState::Claimed) {
        let reached_quote_claimed =
            current == S::QuoteClaimed || targets.contains(&S::QuoteClaimed);
        if reached_quote_claimed {
            targets.push(S::BaseClaimed);
            targets.push(S::Complete);
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_04_chain_connectors::{
        AccountConnector, AccountProfile, UtxoConnector, UtxoProfile,
    };
    use shared_types::{ManualClock, OrderId, PeerTag, SwapSecret};
    use tokio::time::timeout;

    const NOW: u64 = 1_700_000_000;

    struct Harness {
        bus: Arc<SettlementBus>,
        clock: ManualClock,
        handle: CoordinatorHandle,
        proposal_id: ProposalId,
        _shutdown: watch::Sender<bool>,
    }

    fn fast_config() -> SettlementConfig {
        SettlementConfig {
            tick_interval_ms: 20,
            notice_interval_secs: 1,
            poll_interval_secs: 5,
            ..SettlementConfig::default()
        }
    }

    fn spawn_coordinator(config: SettlementConfig) -> Harness {
        let clock = ManualClock::at(NOW);
        let bus = Arc::new(SettlementBus::new());
        let base = Arc::new(UtxoConnector::new(
            UtxoProfile::default(),
            Arc::new(clock.clone()),
        ));
        let quote = Arc::new(AccountConnector::new(
            AccountProfile::default(),
            Arc::new(clock.clone()),
        ));
        let mut registry = ConnectorRegistry::new(base);
        registry.register(quote);

        let (coordinator, handle) = Coordinator::new(
            bus.clone(),
            Arc::new(registry),
            Arc::new(clock.clone()),
            config,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(coordinator.run(shutdown_rx));

        let order = OrderId::from_nanos(1);
        Harness {
            bus,
            clock,
            handle,
            proposal_id: ProposalId::derive(&order, 2),
            _shutdown: shutdown_tx,
        }
    }

    fn request(h: &Harness, secret: &SwapSecret) -> SettlementPayload {
        SettlementPayload::Request(SettlementRequest {
            proposal_id: h.proposal_id.clone(),
            order_id: h.proposal_id.order_id(),
            maker_peer: PeerTag::new("maker"),
            taker_peer: PeerTag::new("taker"),
            base_amount: 100,
            quote_amount: 1_200,
            chain_tag: "acct-main".into(),
            secret: secret.clone(),
        })
    }

    fn status(h: &Harness, target: SettlementStatus, party: SwapParty, tx: &str) -> SettlementPayload {
        SettlementPayload::Status(StatusUpdate {
            proposal_id: h.proposal_id.clone(),
            target,
            party,
            tx_id: Some(tx.to_string()),
            escrow_address: None,
            pubkey_hash: None,
            funding_address: None,
        })
    }

    async fn wait_status(h: &Harness, want: SettlementStatus) {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(Some(snap)) = h.handle.snapshot(h.proposal_id.clone()).await {
                    if snap.status == want {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {want:?}"));
    }

    #[tokio::test]
    async fn test_request_ingest_advertises_hash_lock() {
        let h = spawn_coordinator(fast_config());
        let secret = SwapSecret::new([0x01u8; 32]);
        let mut htlc_sub = h.bus.subscribe("settlement.htlc.*");

        h.bus.publish(request(&h, &secret), NOW).await;

        let msg = timeout(Duration::from_secs(5), htlc_sub.recv())
            .await
            .unwrap()
            .unwrap();
        let SettlementPayload::Htlc(params) = msg.payload else {
            panic!("expected htlc params");
        };
        assert_eq!(params.hash_lock, hash_lock(&secret));
        assert!(params.quote_locktime < params.base_locktime);

        wait_status(&h, SettlementStatus::Ready).await;
    }

    #[tokio::test]
    async fn test_secret_only_after_both_locked() {
        let h = spawn_coordinator(fast_config());
        let secret = SwapSecret::new([0x02u8; 32]);
        let mut secret_sub = h.bus.subscribe("settlement.secret.*");

        h.bus.publish(request(&h, &secret), NOW).await;
        wait_status(&h, SettlementStatus::Ready).await;

        h.bus
            .publish(
                status(&h, SettlementStatus::MakerLocked, SwapParty::Maker, "base-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::MakerLocked).await;

        // One leg locked: no secret on the wire.
        assert!(matches!(secret_sub.try_recv(), Ok(None)));

        h.bus
            .publish(
                status(&h, SettlementStatus::TakerLocked, SwapParty::Taker, "quote-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::BothLocked).await;

        let msg = timeout(Duration::from_secs(5), secret_sub.recv())
            .await
            .unwrap()
            .unwrap();
        let SettlementPayload::Secret(reveal) = msg.payload else {
            panic!("expected secret reveal");
        };
        assert_eq!(reveal.secret.expose(), secret.expose());
    }

    #[tokio::test]
    async fn test_full_status_walk_to_complete() {
        let h = spawn_coordinator(fast_config());
        let secret = SwapSecret::new([0x03u8; 32]);

        h.bus.publish(request(&h, &secret), NOW).await;
        wait_status(&h, SettlementStatus::Ready).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::MakerLocked, SwapParty::Maker, "base-tx"),
                NOW,
            )
            .await;
        h.bus
            .publish(
                status(&h, SettlementStatus::TakerLocked, SwapParty::Taker, "quote-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::BothLocked).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::QuoteClaimed, SwapParty::Maker, "claim-q"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::QuoteClaimed).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::BaseClaimed, SwapParty::Taker, "claim-b"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::Complete).await;
    }

    #[tokio::test]
    async fn test_duplicate_status_is_idempotent() {
        let h = spawn_coordinator(fast_config());
        let secret = SwapSecret::new([0x04u8; 32]);

        h.bus.publish(request(&h, &secret), NOW).await;
        wait_status(&h, SettlementStatus::Ready).await;

        for _ in 0..3 {
            h.bus
                .publish(
                    status(&h, SettlementStatus::MakerLocked, SwapParty::Maker, "base-tx"),
                    NOW,
                )
                .await;
        }
        wait_status(&h, SettlementStatus::MakerLocked).await;

        let snap = h.handle.snapshot(h.proposal_id.clone()).await.unwrap().unwrap();
        assert_eq!(snap.status, SettlementStatus::MakerLocked);
        assert_eq!(snap.base_lock_tx.as_deref(), Some("base-tx"));
    }

    #[tokio::test]
    async fn test_refund_notice_after_quote_locktime() {
        let h = spawn_coordinator(fast_config());
        let secret = SwapSecret::new([0x05u8; 32]);
        let mut status_sub = h.bus.subscribe("settlement.status.*");

        h.bus.publish(request(&h, &secret), NOW).await;
        wait_status(&h, SettlementStatus::Ready).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::MakerLocked, SwapParty::Maker, "base-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::MakerLocked).await;

        // Cross T_Q: the maker's refund branch notice must surface.
        h.clock.advance(SettlementConfig::default().quote_locktime_secs + 10);

        let notice = timeout(Duration::from_secs(5), async {
            loop {
                let msg = status_sub.recv().await.expect("bus open");
                if let SettlementPayload::Notice(notice) = msg.payload {
                    return notice;
                }
            }
        })
        .await
        .expect("refund notice");
        assert_eq!(notice.kind, NoticeKind::RefundReady(SwapParty::Maker));

        // The maker's client refunds; the terminal state lands.
        h.bus
            .publish(
                status(&h, SettlementStatus::RefundedMaker, SwapParty::Maker, "refund-tx"),
                h.clock.unix_now(),
            )
            .await;
        wait_status(&h, SettlementStatus::RefundedMaker).await;
    }

    #[tokio::test]
    async fn test_secret_reemitted_with_backoff() {
        let h = spawn_coordinator(fast_config());
        let secret = SwapSecret::new([0x06u8; 32]);
        let mut secret_sub = h.bus.subscribe("settlement.secret.*");

        h.bus.publish(request(&h, &secret), NOW).await;
        wait_status(&h, SettlementStatus::Ready).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::MakerLocked, SwapParty::Maker, "base-tx"),
                NOW,
            )
            .await;
        h.bus
            .publish(
                status(&h, SettlementStatus::TakerLocked, SwapParty::Taker, "quote-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::BothLocked).await;

        // Initial reveal.
        timeout(Duration::from_secs(5), secret_sub.recv())
            .await
            .unwrap()
            .unwrap();

        // Cross the first backoff boundary: a re-emission follows.
        h.clock
            .advance(SettlementConfig::default().secret_reemit_base_secs + 1);
        let msg = timeout(Duration::from_secs(5), secret_sub.recv())
            .await
            .expect("re-emission")
            .unwrap();
        assert!(matches!(msg.payload, SettlementPayload::Secret(_)));
    }

    #[tokio::test]
    async fn test_retention_collects_terminal_swaps() {
        let h = spawn_coordinator(SettlementConfig {
            retention_secs: 60,
            ..fast_config()
        });
        let secret = SwapSecret::new([0x07u8; 32]);

        h.bus.publish(request(&h, &secret), NOW).await;
        wait_status(&h, SettlementStatus::Ready).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::MakerLocked, SwapParty::Maker, "base-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::MakerLocked).await;
        h.bus
            .publish(
                status(&h, SettlementStatus::RefundedMaker, SwapParty::Maker, "refund-tx"),
                NOW,
            )
            .await;
        wait_status(&h, SettlementStatus::RefundedMaker).await;

        h.clock.advance(120);
        timeout(Duration::from_secs(5), async {
            loop {
                if h
                    .handle
                    .snapshot(h.proposal_id.clone())
                    .await
                    .unwrap()
                    .is_none()
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("record collected");
    }

    #[test]
    fn test_reconcile_targets_quote_claim() {
        let targets = reconcile_targets(
            SettlementStatus::BothLocked,
            Some(HtlcState::Locked),
            Some(HtlcState::Claimed),
        );
        assert_eq!(targets, vec![SettlementStatus::QuoteClaimed]);
    }

    #[test]
    fn test_reconcile_targets_full_completion() {
        let targets = reconcile_targets(
            SettlementStatus::QuoteClaimed,
            Some(HtlcState::Claimed),
            Some(HtlcState::Claimed),
        );
        assert_eq!(
            targets,
            vec![SettlementStatus::BaseClaimed, SettlementStatus::Complete]
        );
    }

    #[test]
    fn test_reconcile_targets_refunds() {
        assert_eq!(
            reconcile_targets(
                SettlementStatus::MakerLocked,
                Some(HtlcState::Refunded),
                None
            ),
            vec![SettlementStatus::RefundedMaker]
        );
        assert_eq!(
            reconcile_targets(
                SettlementStatus::BothLocked,
                Some(HtlcState::Refunded),
                Some(HtlcState::Refunded)
            ),
            vec![SettlementStatus::RefundedBoth]
        );
    }
}
