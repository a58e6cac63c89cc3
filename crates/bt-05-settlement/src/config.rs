//! Coordinator configuration.

/// Configuration for the settlement coordinator.
#[derive(Clone, Debug)]
pub struct SettlementConfig {
    /// Base-chain refund locktime, seconds after ingest (`T_B`).
    pub base_locktime_secs: u64,
    /// Quote-chain refund locktime, seconds after ingest (`T_Q`).
    /// Must stay below `base_locktime_secs` minus both finality windows.
    pub quote_locktime_secs: u64,
    /// How long terminal records are kept before collection.
    pub retention_secs: u64,
    /// Connector reconciliation cadence, in coordinator clock seconds.
    pub poll_interval_secs: u64,
    /// Notice re-surfacing cadence, in coordinator clock seconds.
    pub notice_interval_secs: u64,
    /// Initial secret re-emission backoff after `both_locked`.
    pub secret_reemit_base_secs: u64,
    /// Cap on the secret re-emission backoff.
    pub secret_reemit_cap_secs: u64,
    /// Wall-clock tick driving the watcher loop, milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            base_locktime_secs: 24 * 3600,
            quote_locktime_secs: 12 * 3600,
            retention_secs: 3600,
            poll_interval_secs: 30,
            notice_interval_secs: 60,
            secret_reemit_base_secs: 30,
            secret_reemit_cap_secs: 3600,
            tick_interval_ms: 1000,
        }
    }
}
