//! Component wiring.
//!
//! Builds every component explicitly and ties their lifecycles to one
//! shutdown channel. No globals: the [`Node`] value owns the handles.

use crate::adapters::NetworkInfoAdapter;
use crate::config::NodeConfig;
use crate::glue::SettlementClient;
use bt_01_peer_network::{NetworkConfig, NetworkHandle, PeerNetwork};
use bt_02_order_store::OrderStore;
use bt_03_negotiation::{
    EngineParams, NegotiationCounters, NegotiationEngine, NegotiationHandle,
};
use bt_04_chain_connectors::{
    AccountConnector, AccountProfile, ConnectorRegistry, UtxoConnector, UtxoProfile,
};
use bt_05_settlement::{Coordinator, CoordinatorHandle};
use bt_06_api_gateway::{router, AppState, SessionStore};
use shared_bus::SettlementBus;
use shared_crypto::{IdentityKeyPair, PeerKeyCache};
use shared_types::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Acceptance handoff channel depth.
const ACCEPTED_BUFFER: usize = 32;

/// A wired node.
pub struct Node {
    /// The configuration it was built from.
    pub config: NodeConfig,
    /// Order/proposal tables.
    pub store: Arc<OrderStore>,
    /// Negotiation engine handle.
    pub negotiation: NegotiationHandle,
    /// Message-hygiene counters.
    pub counters: Arc<NegotiationCounters>,
    /// Transport handle.
    pub network: NetworkHandle,
    /// Settlement glue / actions implementation.
    pub settlement: Arc<SettlementClient>,
    /// Coordinator query handle, when this process runs the coordinator.
    pub coordinator: Option<CoordinatorHandle>,
    /// Gateway sessions.
    pub sessions: Arc<SessionStore>,
    /// Token issued for the local operator at build time.
    pub operator_token: String,
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Construct and start every component. Must run inside a tokio
    /// runtime; long-running tasks are spawned here.
    pub fn build(config: NodeConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let identity = match &config.identity.secret_key_hex {
            Some(hex_key) => {
                let bytes: [u8; 32] = hex::decode(hex_key)
                    .map_err(|e| anyhow::anyhow!("identity key is not hex: {e}"))?
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("identity key must be 32 bytes"))?;
                IdentityKeyPair::from_bytes(bytes)
                    .map_err(|e| anyhow::anyhow!("identity key invalid: {e}"))?
            }
            None => IdentityKeyPair::generate(),
        };
        let identity = Arc::new(identity);

        let bus = Arc::new(SettlementBus::new());
        let store = Arc::new(OrderStore::new());
        let key_cache = Arc::new(PeerKeyCache::new());

        let base = Arc::new(UtxoConnector::new(UtxoProfile::default(), clock.clone()));
        let quote = Arc::new(AccountConnector::new(
            AccountProfile::default(),
            clock.clone(),
        ));
        let mut registry = ConnectorRegistry::new(base);
        registry.register(quote);
        let registry = Arc::new(registry);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Transport.
        let network_config = NetworkConfig {
            listen_addr: config.network.listen_addr.clone(),
            bootstrap_peers: config.network.bootstrap_peers.clone(),
            enable_mdns: config.network.enable_mdns,
            ..NetworkConfig::default()
        };
        let (network, network_handle, network_events) = PeerNetwork::new(&network_config)
            .map_err(|e| anyhow::anyhow!("transport init failed: {e}"))?;
        tokio::spawn(network.run());

        // Negotiation engine.
        let (accepted_tx, accepted_rx) = mpsc::channel(ACCEPTED_BUFFER);
        let (engine, negotiation, counters) = NegotiationEngine::new(EngineParams {
            identity,
            local_peer: network_handle.local_peer.clone(),
            store: store.clone(),
            key_cache,
            outbound: Arc::new(network_handle.clone()),
            clock: clock.clone(),
            config: (&config.negotiation).into(),
            accepted_tx,
            network_events,
        });
        tokio::spawn(engine.run(shutdown_rx.clone()));

        // Settlement glue.
        let settlement = SettlementClient::new(
            bus.clone(),
            store.clone(),
            registry.clone(),
            clock.clone(),
        );
        let _glue_task = settlement.spawn(accepted_rx, shutdown_rx.clone());

        // Coordinator, when this process hosts it.
        let coordinator = if config.settlement.run_coordinator {
            let (coordinator, handle) = Coordinator::new(
                bus.clone(),
                registry,
                clock,
                (&config.settlement).into(),
            );
            tokio::spawn(coordinator.run(shutdown_rx));
            Some(handle)
        } else {
            None
        };

        let sessions = Arc::new(SessionStore::new());
        let operator_token = sessions.issue("operator");

        info!(peer = %network_handle.local_peer, "node wired");
        Ok(Self {
            config,
            store,
            negotiation,
            counters,
            network: network_handle,
            settlement,
            coordinator,
            sessions,
            operator_token,
            shutdown_tx,
        })
    }

    /// The gateway router over this node.
    #[must_use]
    pub fn router(&self) -> axum::Router {
        router(AppState {
            sessions: self.sessions.clone(),
            store: self.store.clone(),
            negotiation: self.negotiation.clone(),
            settlement: self.settlement.clone(),
            network: Arc::new(NetworkInfoAdapter(self.network.clone())),
            counters: self.counters.clone(),
        })
    }

    /// Serve the gateway until ctrl-c, then signal shutdown.
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.config.gateway.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "gateway listening");

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        self.shutdown();
        Ok(())
    }

    /// Signal every component to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
