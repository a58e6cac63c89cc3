//! The engine loop.
//!
//! One task owns everything: commands from the handle, inbound envelopes
//! from the transport, and the periodic order-expiry sweep.

use crate::config::NegotiationConfig;
use crate::errors::NegotiationError;
use crate::handle::{CreateOrderParams, NegotiationCommand, NegotiationHandle};
use crate::messages::{
    EncryptedOrderDetails, OrderAnnouncement, OrderRequest, ProposalAcceptance, ProposalBody,
    ProposalMsg, MSG_ENCRYPTED_ORDER_DETAILS, MSG_ORDER_ANNOUNCEMENT, MSG_ORDER_REQUEST,
    MSG_PROPOSAL, MSG_PROPOSAL_ACCEPTANCE,
};
use crate::ports::Outbound;
use bt_01_peer_network::NetworkEvent;
use bt_02_order_store::{OrderStore, StoreError};
use shared_crypto::{ecies, hash_lock, IdentityKeyPair, PeerKeyCache, SignedEnvelope};
use shared_types::{
    Clock, Order, OrderId, OrderPhase, PeerTag, Proposal, ProposalId, ProposalStatus, SwapSecret,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Command channel depth.
const COMMAND_BUFFER: usize = 64;

/// Drop counters for message-layer hygiene, surfaced in node status.
#[derive(Debug, Default)]
pub struct NegotiationCounters {
    /// Envelopes dropped for an invalid signature.
    pub bad_signature: AtomicU64,
    /// Envelopes dropped for being outside the replay window.
    pub stale: AtomicU64,
    /// ECIES bodies that did not decrypt for us (not an error).
    pub not_for_us: AtomicU64,
}

impl NegotiationCounters {
    /// Snapshot as `(bad_signature, stale, not_for_us)`.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.bad_signature.load(Ordering::Relaxed),
            self.stale.load(Ordering::Relaxed),
            self.not_for_us.load(Ordering::Relaxed),
        )
    }
}

/// Everything the settlement glue needs when a proposal is accepted.
#[derive(Debug)]
pub struct AcceptanceHandoff {
    /// The accepted proposal, hash-lock set.
    pub proposal: Proposal,
    /// The order it settles.
    pub order: Order,
    /// The maker-supplied preimage.
    pub secret: SwapSecret,
}

/// Construction parameters for the engine.
pub struct EngineParams {
    /// The local user's identity keypair.
    pub identity: Arc<IdentityKeyPair>,
    /// The local transport peer id.
    pub local_peer: PeerTag,
    /// The order/proposal tables (engine is the writer).
    pub store: Arc<OrderStore>,
    /// Pinned peer verification keys.
    pub key_cache: Arc<PeerKeyCache>,
    /// Outbound transport.
    pub outbound: Arc<dyn Outbound>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Engine configuration.
    pub config: NegotiationConfig,
    /// Settlement handoff channel, consumed by the node glue.
    pub accepted_tx: mpsc::Sender<AcceptanceHandoff>,
    /// Inbound transport events.
    pub network_events: mpsc::Receiver<NetworkEvent>,
}

/// The negotiation engine. Owns order/proposal mutation.
pub struct NegotiationEngine {
    identity: Arc<IdentityKeyPair>,
    local_peer: PeerTag,
    store: Arc<OrderStore>,
    key_cache: Arc<PeerKeyCache>,
    outbound: Arc<dyn Outbound>,
    clock: Arc<dyn Clock>,
    config: NegotiationConfig,
    counters: Arc<NegotiationCounters>,
    accepted_tx: mpsc::Sender<AcceptanceHandoff>,
    command_rx: mpsc::Receiver<NegotiationCommand>,
    network_events: mpsc::Receiver<NetworkEvent>,
    network_closed: bool,
}

impl NegotiationEngine {
    /// Build the engine and its handle.
    #[must_use]
    pub fn new(params: EngineParams) -> (Self, NegotiationHandle, Arc<NegotiationCounters>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let counters = Arc::new(NegotiationCounters::default());
        let engine = Self {
            identity: params.identity,
            local_peer: params.local_peer,
            store: params.store,
            key_cache: params.key_cache,
            outbound: params.outbound,
            clock: params.clock,
            config: params.config,
            counters: counters.clone(),
            accepted_tx: params.accepted_tx,
            command_rx,
            network_events: params.network_events,
            network_closed: false,
        };
        (engine, NegotiationHandle::new(command_tx), counters)
    }

    /// Drive the engine loop until shutdown is signalled or every handle
    /// is gone. Run in a dedicated tokio task.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = tokio::time::interval(Duration::from_secs(
            self.config.sweep_interval_secs.max(1),
        ));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("negotiation engine shutting down");
                        return;
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("all negotiation handles dropped, stopping engine");
                            return;
                        }
                    }
                }

                event = self.network_events.recv(), if !self.network_closed => {
                    match event {
                        Some(event) => self.handle_network_event(event).await,
                        None => {
                            warn!("transport event stream closed");
                            self.network_closed = true;
                        }
                    }
                }

                _ = sweep.tick() => {
                    self.sweep_expired();
                }
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, command: NegotiationCommand) {
        match command {
            NegotiationCommand::CreateOrder { params, reply } => {
                let _ = reply.send(self.cmd_create_order(params).await);
            }
            NegotiationCommand::RequestDetails { order_id, reply } => {
                let _ = reply.send(self.cmd_request_details(order_id).await);
            }
            NegotiationCommand::Propose {
                order_id,
                price,
                amount,
                reply,
            } => {
                let _ = reply.send(self.cmd_propose(order_id, price, amount).await);
            }
            NegotiationCommand::Accept {
                proposal_id,
                secret,
                reply,
            } => {
                let _ = reply.send(self.cmd_accept(proposal_id, secret).await);
            }
            NegotiationCommand::Reject { proposal_id, reply } => {
                let _ = reply.send(self.cmd_reject(&proposal_id));
            }
        }
    }

    async fn cmd_create_order(
        &mut self,
        params: CreateOrderParams,
    ) -> Result<Order, NegotiationError> {
        let order = Order {
            order_id: OrderId::from_nanos(self.clock.unix_nanos()),
            maker_peer: self.local_peer.clone(),
            amount: params.amount,
            quote_asset_tag: params.quote_asset_tag,
            min_price: params.min_price,
            max_price: params.max_price,
            settlement_chain_tag: params.settlement_chain_tag,
            timestamp: self.clock.unix_now(),
            target_taker: params.target_taker,
            phase: OrderPhase::Created,
            stub: false,
        };
        self.store.insert_order(order.clone())?;

        // Targeted orders broadcast only the zeroed stub.
        let public_form = if order.is_targeted() {
            order.to_stub()
        } else {
            order.clone()
        };
        let envelope = SignedEnvelope::seal_record(
            &self.identity,
            MSG_ORDER_ANNOUNCEMENT,
            &OrderAnnouncement { order: public_form },
            self.clock.unix_now(),
        )?;
        if let Err(e) = self.outbound.broadcast(envelope).await {
            // Best-effort: the order exists locally either way.
            warn!(order_id = %order.order_id, error = %e, "announcement broadcast failed");
        }

        let order = self
            .store
            .advance_order_phase(&order.order_id, OrderPhase::Announced)?;
        info!(order_id = %order.order_id, targeted = order.is_targeted(), "order announced");
        Ok(order)
    }

    async fn cmd_request_details(&mut self, order_id: OrderId) -> Result<(), NegotiationError> {
        let order = self
            .store
            .order(&order_id)
            .ok_or_else(|| NegotiationError::OrderNotFound(order_id.clone()))?;

        let request = OrderRequest {
            order_id: order_id.clone(),
            taker_peer: self.local_peer.clone(),
        };
        let envelope = SignedEnvelope::seal_record(
            &self.identity,
            MSG_ORDER_REQUEST,
            &request,
            self.clock.unix_now(),
        )?;

        // Prefer the direct path to the maker; fall back to broadcast.
        if let Err(e) = self
            .outbound
            .send_direct(order.maker_peer.clone(), vec![envelope.clone()])
            .await
        {
            debug!(order_id = %order_id, error = %e, "direct request failed, broadcasting");
            self.outbound.broadcast(envelope).await?;
        }
        Ok(())
    }

    async fn cmd_propose(
        &mut self,
        order_id: OrderId,
        price: u64,
        amount: u64,
    ) -> Result<Proposal, NegotiationError> {
        let order = self
            .store
            .order(&order_id)
            .ok_or_else(|| NegotiationError::OrderNotFound(order_id.clone()))?;
        match order.phase {
            OrderPhase::Accepted => {
                return Err(NegotiationError::OrderAlreadyAccepted(order_id))
            }
            OrderPhase::Expired => return Err(NegotiationError::OrderExpired(order_id)),
            _ => {}
        }
        if order.stub {
            return Err(NegotiationError::DetailsMissing(order_id));
        }

        let maker_key = self
            .key_cache
            .pinned_key(&order.maker_peer)
            .ok_or_else(|| NegotiationError::UnknownPeerKey(order.maker_peer.clone()))?;

        let proposal_id = ProposalId::derive(&order_id, self.clock.unix_nanos());
        let proposal = Proposal {
            proposal_id: proposal_id.clone(),
            order_id: order_id.clone(),
            proposer_peer: self.local_peer.clone(),
            amount,
            price,
            status: ProposalStatus::Pending,
            settlement_status: None,
            hash_lock: None,
            timestamp: self.clock.unix_now(),
        };
        self.store.insert_proposal(proposal.clone())?;
        let _ = self
            .store
            .advance_order_phase(&order_id, OrderPhase::ProposalsOpen);

        // Terms travel encrypted to the maker only.
        let body = ProposalBody { amount, price };
        let sealed = ecies::encrypt(
            &maker_key,
            &bincode::serialize(&body)
                .map_err(|e| shared_crypto::CryptoError::MalformedPayload(e.to_string()))?,
        )?;
        let msg = ProposalMsg {
            proposal_id: proposal_id.clone(),
            order_id,
            proposer_peer: self.local_peer.clone(),
            body: sealed,
        };
        let envelope = SignedEnvelope::seal_record(
            &self.identity,
            MSG_PROPOSAL,
            &msg,
            self.clock.unix_now(),
        )?;
        if let Err(e) = self.outbound.broadcast(envelope).await {
            warn!(proposal_id = %proposal_id, error = %e, "proposal broadcast failed");
        }

        info!(proposal_id = %proposal_id, "proposal sent");
        Ok(proposal)
    }

    async fn cmd_accept(
        &mut self,
        proposal_id: ProposalId,
        secret: SwapSecret,
    ) -> Result<Proposal, NegotiationError> {
        let proposal = self
            .store
            .proposal(&proposal_id)
            .ok_or_else(|| NegotiationError::ProposalNotFound(proposal_id.clone()))?;
        let order = self
            .store
            .order(&proposal.order_id)
            .ok_or_else(|| NegotiationError::OrderNotFound(proposal.order_id.clone()))?;
        if order.maker_peer != self.local_peer {
            return Err(NegotiationError::NotMyOrder(order.order_id));
        }

        // The maker commits the preimage here; the hash-lock is derived
        // once and propagates everywhere else.
        let lock = hash_lock(&secret);
        let accepted = self
            .store
            .accept_proposal(&proposal_id, lock)
            .map_err(|e| match e {
                StoreError::OrderAlreadyAccepted(id) => {
                    NegotiationError::OrderAlreadyAccepted(id)
                }
                other => NegotiationError::Store(other),
            })?;
        info!(proposal_id = %proposal_id, hash_lock = %lock, "proposal accepted");

        // Hand the swap to the settlement side before telling the taker;
        // the coordinator must know the preimage first.
        let handoff = AcceptanceHandoff {
            proposal: accepted.clone(),
            order,
            secret,
        };
        if self.accepted_tx.send(handoff).await.is_err() {
            warn!(proposal_id = %proposal_id, "settlement glue is gone, handoff dropped");
        }

        let acceptance = ProposalAcceptance {
            proposal_id: proposal_id.clone(),
            hash_lock: lock,
        };
        let envelope = SignedEnvelope::seal_record(
            &self.identity,
            MSG_PROPOSAL_ACCEPTANCE,
            &acceptance,
            self.clock.unix_now(),
        )?;
        self.outbound
            .send_direct(accepted.proposer_peer.clone(), vec![envelope])
            .await?;

        Ok(accepted)
    }

    fn cmd_reject(&mut self, proposal_id: &ProposalId) -> Result<Proposal, NegotiationError> {
        Ok(self.store.reject_proposal(proposal_id)?)
    }

    // =========================================================================
    // Inbound messages
    // =========================================================================

    async fn handle_network_event(&mut self, event: NetworkEvent) {
        let NetworkEvent::Envelope { from, envelope, .. } = event else {
            return;
        };

        let signer = match envelope.verify_fresh(self.clock.unix_now(), self.config.replay_window_secs)
        {
            Ok(signer) => signer,
            Err(shared_crypto::CryptoError::StaleEnvelope { .. }) => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                debug!(peer = %from, "stale envelope dropped");
                return;
            }
            Err(e) => {
                self.counters.bad_signature.fetch_add(1, Ordering::Relaxed);
                debug!(peer = %from, error = %e, "invalid envelope dropped");
                return;
            }
        };
        // Pin/rotate the sender's verification key; rotations warn inside.
        self.key_cache
            .observe(&from, signer, self.clock.unix_now());

        match envelope.msg_type.as_str() {
            MSG_ORDER_ANNOUNCEMENT => self.on_announcement(&envelope),
            MSG_ORDER_REQUEST => self.on_order_request(&envelope).await,
            MSG_ENCRYPTED_ORDER_DETAILS => self.on_order_details(&envelope),
            MSG_PROPOSAL => self.on_proposal(&envelope),
            MSG_PROPOSAL_ACCEPTANCE => self.on_acceptance(&from, &envelope),
            other => debug!(msg_type = other, "unknown message type ignored"),
        }
    }

    fn on_announcement(&mut self, envelope: &SignedEnvelope) {
        let Ok(announcement) = envelope.decode_payload::<OrderAnnouncement>() else {
            debug!("malformed announcement dropped");
            return;
        };
        let mut order = announcement.order;
        if order.maker_peer == self.local_peer {
            return; // own echo
        }
        // Never trust a remote phase; an observed order starts Announced.
        order.phase = OrderPhase::Announced;
        match self.store.insert_order(order.clone()) {
            Ok(()) => debug!(order_id = %order.order_id, stub = order.stub, "order observed"),
            Err(StoreError::DuplicateOrder(_)) => {}
            Err(e) => debug!(error = %e, "announcement ignored"),
        }
    }

    async fn on_order_request(&mut self, envelope: &SignedEnvelope) {
        let Ok(request) = envelope.decode_payload::<OrderRequest>() else {
            debug!("malformed order request dropped");
            return;
        };
        let Some(order) = self.store.order(&request.order_id) else {
            return; // not ours to answer
        };
        if order.maker_peer != self.local_peer {
            return;
        }
        if order.target_taker.as_ref() != Some(&request.taker_peer) {
            // Silently ignore requests from anyone but the intended taker.
            debug!(order_id = %order.order_id, "details request from non-target ignored");
            return;
        }

        let _ = self
            .store
            .advance_order_phase(&order.order_id, OrderPhase::DetailsRequested);

        // Encrypt the full record to the key that signed the request.
        let result = async {
            let plain = bincode::serialize(&order)
                .map_err(|e| shared_crypto::CryptoError::MalformedPayload(e.to_string()))?;
            let body = ecies::encrypt(&envelope.signer_pubkey, &plain)?;
            let details = EncryptedOrderDetails {
                order_id: order.order_id.clone(),
                body,
            };
            let reply = SignedEnvelope::seal_record(
                &self.identity,
                MSG_ENCRYPTED_ORDER_DETAILS,
                &details,
                self.clock.unix_now(),
            )?;
            Ok::<_, NegotiationError>(reply)
        }
        .await;

        match result {
            Ok(reply) => {
                match self
                    .outbound
                    .send_direct(request.taker_peer.clone(), vec![reply])
                    .await
                {
                    Ok(()) => {
                        let _ = self
                            .store
                            .advance_order_phase(&order.order_id, OrderPhase::DetailsSent);
                        debug!(order_id = %order.order_id, taker = %request.taker_peer, "details sent");
                    }
                    Err(e) => {
                        warn!(order_id = %order.order_id, error = %e, "details send failed");
                    }
                }
            }
            Err(e) => warn!(order_id = %order.order_id, error = %e, "details encryption failed"),
        }
    }

    fn on_order_details(&mut self, envelope: &SignedEnvelope) {
        let Ok(details) = envelope.decode_payload::<EncryptedOrderDetails>() else {
            debug!("malformed details message dropped");
            return;
        };
        // Decryption failure is silent: the message may not be for us.
        let Ok(plain) = ecies::decrypt(&self.identity, &details.body) else {
            self.counters.not_for_us.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let Ok(order) = bincode::deserialize::<Order>(&plain) else {
            debug!("details body did not decode");
            return;
        };
        if order.order_id != details.order_id {
            debug!(order_id = %details.order_id, "details body names a different order");
            return;
        }
        match self.store.fill_order_details(order) {
            Ok(()) => info!(order_id = %details.order_id, "targeted order details disclosed"),
            Err(e) => debug!(order_id = %details.order_id, error = %e, "details not applied"),
        }
    }

    fn on_proposal(&mut self, envelope: &SignedEnvelope) {
        let Ok(msg) = envelope.decode_payload::<ProposalMsg>() else {
            debug!("malformed proposal dropped");
            return;
        };
        if msg.proposer_peer == self.local_peer {
            return; // own echo
        }
        let Some(order) = self.store.order(&msg.order_id) else {
            debug!(order_id = %msg.order_id, "proposal for unknown order ignored");
            return;
        };

        // Only the maker can read the terms; everyone else stores the stub.
        let (amount, price) = if order.maker_peer == self.local_peer {
            let Ok(plain) = ecies::decrypt(&self.identity, &msg.body) else {
                self.counters.not_for_us.fetch_add(1, Ordering::Relaxed);
                debug!(proposal_id = %msg.proposal_id, "proposal body did not decrypt for maker");
                return;
            };
            match bincode::deserialize::<ProposalBody>(&plain) {
                Ok(body) => (body.amount, body.price),
                Err(_) => {
                    debug!(proposal_id = %msg.proposal_id, "proposal body did not decode");
                    return;
                }
            }
        } else {
            (0, 0)
        };

        let proposal = Proposal {
            proposal_id: msg.proposal_id.clone(),
            order_id: msg.order_id.clone(),
            proposer_peer: msg.proposer_peer,
            amount,
            price,
            status: ProposalStatus::Pending,
            settlement_status: None,
            hash_lock: None,
            timestamp: envelope.timestamp,
        };
        match self.store.insert_proposal(proposal) {
            Ok(()) => {
                let _ = self
                    .store
                    .advance_order_phase(&msg.order_id, OrderPhase::ProposalsOpen);
                info!(proposal_id = %msg.proposal_id, "proposal observed");
            }
            Err(StoreError::DuplicateProposal(_)) => {}
            Err(e) => debug!(error = %e, "proposal ignored"),
        }
    }

    fn on_acceptance(&mut self, from: &PeerTag, envelope: &SignedEnvelope) {
        let Ok(acceptance) = envelope.decode_payload::<ProposalAcceptance>() else {
            debug!("malformed acceptance dropped");
            return;
        };
        let Some(proposal) = self.store.proposal(&acceptance.proposal_id) else {
            debug!(proposal_id = %acceptance.proposal_id, "acceptance for unknown proposal");
            return;
        };
        if proposal.status == ProposalStatus::Accepted {
            return; // idempotent replay
        }

        match self
            .store
            .accept_proposal(&acceptance.proposal_id, acceptance.hash_lock)
        {
            Ok(_) => {
                info!(
                    proposal_id = %acceptance.proposal_id,
                    hash_lock = %acceptance.hash_lock,
                    "acceptance received, settlement begins"
                );
            }
            Err(StoreError::OrderAlreadyAccepted(order_id)) => {
                // Conflicting acceptances: the lexicographically smallest
                // proposal id is canonical across peers.
                let canonical = self
                    .store
                    .proposals_for_order(&order_id)
                    .into_iter()
                    .filter(|p| p.status == ProposalStatus::Accepted)
                    .map(|p| p.proposal_id)
                    .chain(std::iter::once(acceptance.proposal_id.clone()))
                    .min();
                warn!(
                    peer = %from,
                    order_id = %order_id,
                    canonical = %canonical.map(|c| c.to_string()).unwrap_or_default(),
                    "conflicting acceptance dropped"
                );
            }
            Err(e) => debug!(error = %e, "acceptance not applied"),
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    fn sweep_expired(&mut self) {
        let now = self.clock.unix_now();
        for order in self.store.orders() {
            if order.phase.is_terminal() {
                continue;
            }
            if now.saturating_sub(order.timestamp) > self.config.order_ttl_secs {
                match self
                    .store
                    .advance_order_phase(&order.order_id, OrderPhase::Expired)
                {
                    Ok(_) => info!(order_id = %order.order_id, "order expired"),
                    Err(e) => debug!(order_id = %order.order_id, error = %e, "expiry skipped"),
                }
            }
        }
    }
}
