//! Node↔coordinator glue.
//!
//! Translates negotiation acceptance into a settlement request, mirrors
//! bus traffic onto the local proposal records, and executes the local
//! user's lock/claim/refund actions against the chain connectors —
//! collecting the per-action data (addresses, pubkey hash, signing
//! reference) and reporting each action to the coordinator as a status
//! record. Signing material is used for the single connector call and
//! dropped; nothing is persisted.

use bt_02_order_store::{OrderStore, StoreError};
use bt_03_negotiation::AcceptanceHandoff;
use bt_04_chain_connectors::{
    ChainConnector, ClaimHtlcParams, ConnectorRegistry, LockHtlcParams, RefundHtlcParams,
    SigningMaterial,
};
use bt_06_api_gateway::{
    ActionInput, ActionReceipt, ApiError, SettlementActions, SettlementView, SwapLeg,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::{BusPublisher, SettlementBus};
use shared_types::{
    Clock, ErrorKind, Hash160, NoticeKind, ProposalId, SettlementPayload, SettlementRequest,
    SettlementStatus, StatusUpdate, SwapParty, SwapSecret,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-swap context the glue accumulates from bus traffic and its own
/// actions.
#[derive(Clone, Debug, Default)]
struct SwapContext {
    chain_tag: Option<String>,
    base_locktime: Option<u64>,
    quote_locktime: Option<u64>,
    base_lock_tx: Option<String>,
    base_script: Vec<u8>,
    quote_lock_tx: Option<String>,
    quote_script: Vec<u8>,
    revealed_secret: Option<SwapSecret>,
}

/// The settlement client for one node.
pub struct SettlementClient {
    bus: Arc<SettlementBus>,
    store: Arc<OrderStore>,
    registry: Arc<ConnectorRegistry>,
    clock: Arc<dyn Clock>,
    contexts: RwLock<HashMap<ProposalId, SwapContext>>,
}

impl SettlementClient {
    /// Build the client.
    #[must_use]
    pub fn new(
        bus: Arc<SettlementBus>,
        store: Arc<OrderStore>,
        registry: Arc<ConnectorRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            store,
            registry,
            clock,
            contexts: RwLock::new(HashMap::new()),
        })
    }

    /// Spawn the mirroring task: acceptance handoffs in, bus traffic
    /// folded onto the store and the per-swap contexts.
    pub fn spawn(
        self: &Arc<Self>,
        mut accepted_rx: mpsc::Receiver<AcceptanceHandoff>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut htlc_sub = client.bus.subscribe("settlement.htlc.*");
            let mut status_sub = client.bus.subscribe("settlement.status.*");
            let mut secret_sub = client.bus.subscribe("settlement.secret.*");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("settlement glue shutting down");
                            return;
                        }
                    }

                    handoff = accepted_rx.recv() => {
                        match handoff {
                            Some(handoff) => client.on_acceptance(handoff).await,
                            None => {
                                debug!("negotiation engine gone, stopping glue");
                                return;
                            }
                        }
                    }

                    message = htlc_sub.recv() => {
                        if let Some(message) = message {
                            if let SettlementPayload::Htlc(params) = message.payload {
                                client.on_htlc(params);
                            }
                        }
                    }

                    message = status_sub.recv() => {
                        if let Some(message) = message {
                            match message.payload {
                                SettlementPayload::Status(update) => client.on_status(update),
                                SettlementPayload::Notice(notice) => Self::on_notice(&notice.proposal_id, notice.kind),
                                _ => {}
                            }
                        }
                    }

                    message = secret_sub.recv() => {
                        if let Some(message) = message {
                            if let SettlementPayload::Secret(reveal) = message.payload {
                                client.on_secret(reveal.proposal_id, reveal.secret);
                            }
                        }
                    }
                }
            }
        })
    }

    async fn on_acceptance(&self, handoff: AcceptanceHandoff) {
        let proposal = handoff.proposal;
        let order = handoff.order;
        let quote_amount = proposal.amount.saturating_mul(proposal.price);

        self.contexts
            .write()
            .entry(proposal.proposal_id.clone())
            .or_default()
            .chain_tag = Some(order.settlement_chain_tag.clone());

        info!(proposal_id = %proposal.proposal_id, "publishing settlement request");
        let request = SettlementPayload::Request(SettlementRequest {
            proposal_id: proposal.proposal_id.clone(),
            order_id: order.order_id,
            maker_peer: order.maker_peer,
            taker_peer: proposal.proposer_peer,
            base_amount: proposal.amount,
            quote_amount,
            chain_tag: order.settlement_chain_tag,
            secret: handoff.secret,
        });
        self.bus.publish(request, self.clock.unix_now()).await;
    }

    fn on_htlc(&self, params: shared_types::HtlcParams) {
        // Locktimes first: anyone who observes the mirrored hash-lock may
        // immediately act on this swap.
        {
            let mut contexts = self.contexts.write();
            let ctx = contexts.entry(params.proposal_id.clone()).or_default();
            ctx.base_locktime = Some(params.base_locktime);
            ctx.quote_locktime = Some(params.quote_locktime);
        }
        match self.store.set_hash_lock(&params.proposal_id, params.hash_lock) {
            Ok(()) => debug!(proposal_id = %params.proposal_id, "hash-lock mirrored"),
            Err(e) => debug!(proposal_id = %params.proposal_id, error = %e, "hash-lock not mirrored"),
        }
    }

    fn on_status(&self, update: StatusUpdate) {
        {
            let mut contexts = self.contexts.write();
            let ctx = contexts.entry(update.proposal_id.clone()).or_default();
            match update.target {
                SettlementStatus::MakerLocked => {
                    if update.tx_id.is_some() {
                        ctx.base_lock_tx = update.tx_id.clone();
                    }
                }
                SettlementStatus::TakerLocked => {
                    if update.tx_id.is_some() {
                        ctx.quote_lock_tx = update.tx_id.clone();
                    }
                }
                _ => {}
            }
        }
        self.mirror(&update.proposal_id, update.target);
    }

    /// Fold a status onto the proposal record. A status that outran the
    /// `ready` mirror (acceptance races the bus) backfills it first.
    fn mirror(&self, proposal_id: &ProposalId, target: SettlementStatus) {
        match self.store.set_settlement_status(proposal_id, target) {
            Ok(_) => {
                debug!(proposal_id = %proposal_id, status = ?target, "settlement status mirrored");
            }
            Err(StoreError::InvalidSettlementTransition { from: None, .. })
                if target != SettlementStatus::Ready =>
            {
                if self
                    .store
                    .set_settlement_status(proposal_id, SettlementStatus::Ready)
                    .is_ok()
                {
                    let _ = self.store.set_settlement_status(proposal_id, target);
                    debug!(proposal_id = %proposal_id, status = ?target, "settlement status backfilled");
                }
            }
            Err(e) => {
                debug!(proposal_id = %proposal_id, error = %e, "status not mirrored");
            }
        }
    }

    fn on_notice(proposal_id: &ProposalId, kind: NoticeKind) {
        // User-visible failure surfaces.
        match kind {
            NoticeKind::RefundReady(party) => {
                warn!(proposal_id = %proposal_id, party = ?party, "refund branch is now spendable");
            }
            NoticeKind::SecretAvailable(party) => {
                info!(proposal_id = %proposal_id, party = ?party, "preimage is public, claim is possible");
            }
        }
    }

    fn on_secret(&self, proposal_id: ProposalId, secret: SwapSecret) {
        info!(proposal_id = %proposal_id, "swap preimage received from coordinator");
        self.contexts
            .write()
            .entry(proposal_id)
            .or_default()
            .revealed_secret = Some(secret);
    }

    // =========================================================================
    // Action plumbing
    // =========================================================================

    fn context(&self, proposal_id: &ProposalId) -> Result<SwapContext, ApiError> {
        let mut ctx = self
            .contexts
            .read()
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| {
                ApiError::new(
                    ErrorKind::Precondition,
                    format!("no settlement parameters yet for {proposal_id}"),
                )
            })?;
        if ctx.chain_tag.is_none() {
            ctx.chain_tag = self
                .store
                .proposal(proposal_id)
                .and_then(|p| self.store.order(&p.order_id))
                .map(|o| o.settlement_chain_tag);
        }
        Ok(ctx)
    }

    fn connector_for(
        &self,
        leg: SwapLeg,
        ctx: &SwapContext,
    ) -> Result<Arc<dyn ChainConnector>, ApiError> {
        match leg {
            SwapLeg::Base => Ok(self.registry.base()),
            SwapLeg::Quote => {
                let Some(tag) = ctx.chain_tag.clone() else {
                    return Err(ApiError::new(
                        ErrorKind::Precondition,
                        "settlement chain tag unknown for this swap",
                    ));
                };
                self.registry
                    .by_tag(&tag)
                    .map_err(|e| ApiError::new(e.kind(), e.to_string()))
            }
        }
    }

    fn required<'a>(input: &'a Option<String>, what: &str) -> Result<&'a str, ApiError> {
        input
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::new(ErrorKind::Precondition, format!("{what} is required")))
    }

    fn parse_pubkey_hash(input: &Option<String>) -> Option<Hash160> {
        input
            .as_deref()
            .and_then(|hex_str| hex::decode(hex_str).ok())
            .and_then(|bytes| Hash160::from_slice(&bytes))
    }

    async fn publish_status(&self, update: StatusUpdate) {
        self.bus
            .publish(SettlementPayload::Status(update), self.clock.unix_now())
            .await;
    }

    async fn resolve_secret(
        &self,
        input: &ActionInput,
        ctx: &SwapContext,
    ) -> Result<SwapSecret, ApiError> {
        if let Some(hex_secret) = &input.secret_hex {
            return hex::decode(hex_secret)
                .ok()
                .and_then(|bytes| SwapSecret::from_slice(&bytes))
                .ok_or_else(|| {
                    ApiError::new(ErrorKind::Crypto, "secret must be 32 bytes of hex")
                });
        }
        if let Some(secret) = &ctx.revealed_secret {
            return Ok(secret.clone());
        }
        // Last resort: the preimage may already be public on the quote
        // chain even if the reveal message was missed.
        if let Some(quote_tx) = &ctx.quote_lock_tx {
            if let Ok(connector) = self.connector_for(SwapLeg::Quote, ctx) {
                if let Ok(Some(secret)) = connector.observed_secret(quote_tx).await {
                    return Ok(secret);
                }
            }
        }
        Err(ApiError::new(
            ErrorKind::Precondition,
            "preimage not yet available for this swap",
        ))
    }
}

#[async_trait]
impl SettlementActions for SettlementClient {
    async fn lock(
        &self,
        proposal_id: ProposalId,
        leg: SwapLeg,
        input: ActionInput,
    ) -> Result<ActionReceipt, ApiError> {
        let proposal = self.store.proposal(&proposal_id).ok_or_else(|| {
            ApiError::new(ErrorKind::NotFound, format!("proposal not found: {proposal_id}"))
        })?;
        let hash_lock = proposal.hash_lock.ok_or_else(|| {
            ApiError::new(ErrorKind::Precondition, "hash-lock not yet distributed")
        })?;
        let ctx = self.context(&proposal_id)?;
        let connector = self.connector_for(leg, &ctx)?;
        let (locktime_wall, amount, target, party) = match leg {
            SwapLeg::Base => (
                ctx.base_locktime,
                proposal.amount,
                SettlementStatus::MakerLocked,
                SwapParty::Maker,
            ),
            SwapLeg::Quote => (
                ctx.quote_locktime,
                proposal.amount.saturating_mul(proposal.price),
                SettlementStatus::TakerLocked,
                SwapParty::Taker,
            ),
        };
        let locktime_wall = locktime_wall.ok_or_else(|| {
            ApiError::new(ErrorKind::Precondition, "locktimes not yet distributed")
        })?;

        let recipient = Self::required(&input.recipient_address, "recipient_address")?;
        let refund_address = Self::required(&input.refund_address, "refund_address")?;

        let outcome = connector
            .lock_htlc(LockHtlcParams {
                amount,
                hash_lock,
                recipient: recipient.to_string(),
                refund_address: refund_address.to_string(),
                locktime: connector.locktime_for(locktime_wall),
                signing: SigningMaterial::new(input.signing_ref.clone()),
            })
            .await
            .map_err(|e| ApiError::new(e.kind(), e.to_string()))?;

        {
            let mut contexts = self.contexts.write();
            let stored = contexts.entry(proposal_id.clone()).or_default();
            stored.chain_tag = ctx.chain_tag.clone();
            match leg {
                SwapLeg::Base => {
                    stored.base_lock_tx = Some(outcome.lock_tx_id.clone());
                    stored.base_script = outcome.script.clone();
                }
                SwapLeg::Quote => {
                    stored.quote_lock_tx = Some(outcome.lock_tx_id.clone());
                    stored.quote_script = outcome.script.clone();
                }
            }
        }

        self.publish_status(StatusUpdate {
            proposal_id,
            target,
            party,
            tx_id: Some(outcome.lock_tx_id.clone()),
            escrow_address: Some(outcome.escrow_address.clone()),
            pubkey_hash: Self::parse_pubkey_hash(&input.pubkey_hash),
            funding_address: input.funding_address.clone(),
        })
        .await;

        Ok(ActionReceipt {
            tx_id: outcome.lock_tx_id,
            escrow_address: Some(outcome.escrow_address),
        })
    }

    async fn claim(
        &self,
        proposal_id: ProposalId,
        leg: SwapLeg,
        input: ActionInput,
    ) -> Result<ActionReceipt, ApiError> {
        let ctx = self.context(&proposal_id)?;
        let connector = self.connector_for(leg, &ctx)?;

        let (lock_tx, script, target, party) = match leg {
            SwapLeg::Quote => (
                ctx.quote_lock_tx.clone(),
                ctx.quote_script.clone(),
                SettlementStatus::QuoteClaimed,
                SwapParty::Maker,
            ),
            SwapLeg::Base => (
                ctx.base_lock_tx.clone(),
                ctx.base_script.clone(),
                SettlementStatus::BaseClaimed,
                SwapParty::Taker,
            ),
        };
        let lock_tx = lock_tx.ok_or_else(|| {
            ApiError::new(ErrorKind::Precondition, "that leg is not locked yet")
        })?;

        let recipient = Self::required(&input.recipient_address, "recipient_address")?;
        let secret = self.resolve_secret(&input, &ctx).await?;

        let claim_tx = connector
            .claim_htlc(ClaimHtlcParams {
                lock_tx_id: lock_tx,
                script,
                secret,
                recipient: recipient.to_string(),
                signing: SigningMaterial::new(input.signing_ref.clone()),
            })
            .await
            .map_err(|e| ApiError::new(e.kind(), e.to_string()))?;

        self.publish_status(StatusUpdate {
            proposal_id,
            target,
            party,
            tx_id: Some(claim_tx.clone()),
            escrow_address: None,
            pubkey_hash: Self::parse_pubkey_hash(&input.pubkey_hash),
            funding_address: None,
        })
        .await;

        Ok(ActionReceipt {
            tx_id: claim_tx,
            escrow_address: None,
        })
    }

    async fn refund(
        &self,
        proposal_id: ProposalId,
        leg: SwapLeg,
        input: ActionInput,
    ) -> Result<ActionReceipt, ApiError> {
        let ctx = self.context(&proposal_id)?;
        let connector = self.connector_for(leg, &ctx)?;
        let current = self
            .store
            .proposal(&proposal_id)
            .and_then(|p| p.settlement_status);

        let (lock_tx, script, party) = match leg {
            SwapLeg::Base => (
                ctx.base_lock_tx.clone(),
                ctx.base_script.clone(),
                SwapParty::Maker,
            ),
            SwapLeg::Quote => (
                ctx.quote_lock_tx.clone(),
                ctx.quote_script.clone(),
                SwapParty::Taker,
            ),
        };
        let lock_tx = lock_tx.ok_or_else(|| {
            ApiError::new(ErrorKind::Precondition, "that leg is not locked yet")
        })?;
        let refund_address = Self::required(&input.refund_address, "refund_address")?;

        let refund_tx = connector
            .refund_htlc(RefundHtlcParams {
                lock_tx_id: lock_tx,
                script,
                refund_address: refund_address.to_string(),
                signing: SigningMaterial::new(input.signing_ref.clone()),
            })
            .await
            .map_err(|e| ApiError::new(e.kind(), e.to_string()))?;

        // A one-sided refund out of both_locked has no DAG edge of its
        // own; the coordinator's reconciliation poll promotes the swap to
        // refunded_both once both chains show timeout spends.
        let target = match (leg, current) {
            (SwapLeg::Base, Some(SettlementStatus::MakerLocked))
            | (SwapLeg::Base, Some(SettlementStatus::QuoteClaimed)) => {
                Some(SettlementStatus::RefundedMaker)
            }
            (SwapLeg::Quote, Some(SettlementStatus::TakerLocked)) => {
                Some(SettlementStatus::RefundedTaker)
            }
            _ => None,
        };
        if let Some(target) = target {
            self.publish_status(StatusUpdate {
                proposal_id,
                target,
                party,
                tx_id: Some(refund_tx.clone()),
                escrow_address: None,
                pubkey_hash: None,
                funding_address: None,
            })
            .await;
        } else {
            info!(tx = %refund_tx, "refund broadcast; terminal state follows from reconciliation");
        }

        Ok(ActionReceipt {
            tx_id: refund_tx,
            escrow_address: None,
        })
    }

    async fn status(&self, proposal_id: ProposalId) -> Result<SettlementView, ApiError> {
        let proposal = self.store.proposal(&proposal_id).ok_or_else(|| {
            ApiError::new(ErrorKind::NotFound, format!("proposal not found: {proposal_id}"))
        })?;
        let ctx = self.contexts.read().get(&proposal_id).cloned().unwrap_or_default();
        Ok(SettlementView {
            proposal_id,
            settlement_status: proposal.settlement_status,
            hash_lock: proposal.hash_lock.map(|h| h.to_string()),
            base_lock_tx: ctx.base_lock_tx,
            quote_lock_tx: ctx.quote_lock_tx,
            base_locktime: ctx.base_locktime,
            quote_locktime: ctx.quote_locktime,
        })
    }

    async fn list_pending(&self) -> Result<Vec<SettlementView>, ApiError> {
        let mut views = Vec::new();
        for proposal in self.store.proposals() {
            let Some(status) = proposal.settlement_status else {
                continue;
            };
            if status.is_terminal() {
                continue;
            }
            let ctx = self
                .contexts
                .read()
                .get(&proposal.proposal_id)
                .cloned()
                .unwrap_or_default();
            views.push(SettlementView {
                proposal_id: proposal.proposal_id.clone(),
                settlement_status: proposal.settlement_status,
                hash_lock: proposal.hash_lock.map(|h| h.to_string()),
                base_lock_tx: ctx.base_lock_tx,
                quote_lock_tx: ctx.quote_lock_tx,
                base_locktime: ctx.base_locktime,
                quote_locktime: ctx.quote_locktime,
            });
        }
        views.sort_by(|a, b| a.proposal_id.cmp(&b.proposal_id));
        Ok(views)
    }
}
