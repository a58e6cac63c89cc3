//! Two-party wiring helpers.
//!
//! Every scenario runs over the same shape: parties attached to one
//! loopback transport, one settlement bus, one coordinator, and shared
//! base/quote chains driven by a hand-advanced clock.

use bt_02_order_store::OrderStore;
use bt_03_negotiation::testing::LoopbackRouter;
use bt_03_negotiation::{
    EngineParams, NegotiationConfig, NegotiationEngine, NegotiationHandle,
};
use bt_04_chain_connectors::{
    AccountConnector, AccountProfile, ChainConnector, ConnectorRegistry, NewAddress,
    UtxoConnector, UtxoProfile,
};
use bt_05_settlement::{Coordinator, CoordinatorHandle, SettlementConfig};
use node_runtime::SettlementClient;
use shared_bus::SettlementBus;
use shared_crypto::{IdentityKeyPair, PeerKeyCache};
use shared_types::{ManualClock, PeerTag, ProposalId, SettlementStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Wall-clock origin for every scenario.
pub const NOW: u64 = 1_700_000_000;

/// One wired party: engine, store, settlement glue.
pub struct Party {
    /// Transport peer id.
    pub peer: PeerTag,
    /// The party's order/proposal tables.
    pub store: Arc<OrderStore>,
    /// Negotiation commands.
    pub negotiation: NegotiationHandle,
    /// Settlement glue (implements the gateway actions port).
    pub glue: Arc<SettlementClient>,
}

/// The shared deployment.
pub struct SwapNet {
    /// Hand-advanced wall clock shared by chains and coordinator.
    pub clock: ManualClock,
    /// The settlement bus.
    pub bus: Arc<SettlementBus>,
    /// The base (UTXO) chain.
    pub base: Arc<UtxoConnector>,
    /// The quote (account) chain.
    pub quote: Arc<AccountConnector>,
    /// Coordinator queries.
    pub coordinator: CoordinatorHandle,
    router: Arc<LoopbackRouter>,
    registry: Arc<ConnectorRegistry>,
    shutdown: watch::Sender<bool>,
}

impl SwapNet {
    /// Wire the shared pieces and start the coordinator.
    pub fn start() -> Self {
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
        let mut registry = ConnectorRegistry::new(base.clone());
        registry.register(quote.clone());
        let registry = Arc::new(registry);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (coordinator, handle) = Coordinator::new(
            bus.clone(),
            registry.clone(),
            Arc::new(clock.clone()),
            SettlementConfig {
                tick_interval_ms: 20,
                notice_interval_secs: 1,
                poll_interval_secs: 2,
                ..SettlementConfig::default()
            },
        );
        tokio::spawn(coordinator.run(shutdown_rx));

        Self {
            clock,
            bus,
            base,
            quote,
            coordinator: handle,
            router: LoopbackRouter::new(),
            registry,
            shutdown,
        }
    }

    /// Attach a new party to the deployment.
    pub fn spawn_party(&self, name: &str) -> Party {
        let peer = PeerTag::new(name);
        let (outbound, network_events) = self.router.attach(peer.clone());
        let store = Arc::new(OrderStore::new());
        let (accepted_tx, accepted_rx) = mpsc::channel(8);

        let (engine, negotiation, _counters) = NegotiationEngine::new(EngineParams {
            identity: Arc::new(IdentityKeyPair::generate()),
            local_peer: peer.clone(),
            store: store.clone(),
            key_cache: Arc::new(PeerKeyCache::new()),
            outbound,
            clock: Arc::new(self.clock.clone()),
            config: NegotiationConfig::default(),
            accepted_tx,
            network_events,
        });
        tokio::spawn(engine.run(self.shutdown.subscribe()));

        let glue = SettlementClient::new(
            self.bus.clone(),
            store.clone(),
            self.registry.clone(),
            Arc::new(self.clock.clone()),
        );
        let _glue_task = glue.spawn(accepted_rx, self.shutdown.subscribe());

        Party {
            peer,
            store,
            negotiation,
            glue,
        }
    }

    /// A funded base-chain address.
    pub async fn base_address(&self, funds: u64) -> NewAddress {
        let address = self.base.new_address().await.expect("base address");
        if funds > 0 {
            self.base.credit(&address.address, funds).expect("credit");
        }
        address
    }

    /// A funded quote-chain address.
    pub async fn quote_address(&self, funds: u64) -> NewAddress {
        let address = self.quote.new_address().await.expect("quote address");
        if funds > 0 {
            self.quote.credit(&address.address, funds).expect("credit");
        }
        address
    }
}

impl Drop for SwapNet {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Poll until `probe` yields a value or five seconds pass.
pub async fn wait_for<T>(what: &str, mut probe: impl FnMut() -> Option<T>) -> T {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(value) = probe() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Wait until a party's proposal mirror reaches `want`.
pub async fn wait_settlement(party: &Party, proposal_id: &ProposalId, want: SettlementStatus) {
    wait_for(&format!("{want:?} on {}", party.peer), || {
        party
            .store
            .proposal(proposal_id)
            .filter(|p| p.settlement_status == Some(want))
    })
    .await;
}

/// Wait until a party's glue holds the distributed HTLC parameters
/// (hash-lock and locktimes), so lock actions can follow.
pub async fn wait_htlc_params(party: &Party, proposal_id: &ProposalId) {
    use bt_06_api_gateway::SettlementActions;

    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(view) = party.glue.status(proposal_id.clone()).await {
                if view.quote_locktime.is_some() && view.hash_lock.is_some() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for htlc params on {}", party.peer));
}
