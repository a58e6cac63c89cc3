//! Node configuration.
//!
//! One sectioned record with sane defaults; every field can be overridden
//! from a TOML file.

use serde::Deserialize;
use std::path::Path;

/// Complete node configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Peer transport section.
    pub network: NetworkSection,
    /// Gateway section.
    pub gateway: GatewaySection,
    /// Negotiation section.
    pub negotiation: NegotiationSection,
    /// Settlement section.
    pub settlement: SettlementSection,
    /// Identity section.
    pub identity: IdentitySection,
}

impl NodeConfig {
    /// Load a TOML config file.
    ///
    /// # Errors
    ///
    /// I/O or parse failures, with the offending path in context.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
        Ok(config)
    }
}

/// Peer transport configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Multiaddr to listen on.
    pub listen_addr: String,
    /// Peers to dial at startup.
    pub bootstrap_peers: Vec<String>,
    /// Enable mDNS discovery.
    pub enable_mdns: bool,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/49222".to_string(),
            bootstrap_peers: Vec::new(),
            enable_mdns: true,
        }
    }
}

/// Gateway configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Socket address the REST surface binds.
    pub bind_addr: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8650".to_string(),
        }
    }
}

/// Negotiation configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NegotiationSection {
    /// Replay window for signed envelopes, seconds.
    pub replay_window_secs: u64,
    /// Order time-to-live, seconds.
    pub order_ttl_secs: u64,
    /// Expiry sweep cadence, seconds.
    pub sweep_interval_secs: u64,
}

impl Default for NegotiationSection {
    fn default() -> Self {
        let defaults = bt_03_negotiation::NegotiationConfig::default();
        Self {
            replay_window_secs: defaults.replay_window_secs,
            order_ttl_secs: defaults.order_ttl_secs,
            sweep_interval_secs: defaults.sweep_interval_secs,
        }
    }
}

impl From<&NegotiationSection> for bt_03_negotiation::NegotiationConfig {
    fn from(section: &NegotiationSection) -> Self {
        Self {
            replay_window_secs: section.replay_window_secs,
            order_ttl_secs: section.order_ttl_secs,
            sweep_interval_secs: section.sweep_interval_secs,
        }
    }
}

/// Settlement configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SettlementSection {
    /// Run the coordinator in this process.
    pub run_coordinator: bool,
    /// Base-chain refund locktime, seconds after ingest.
    pub base_locktime_secs: u64,
    /// Quote-chain refund locktime, seconds after ingest.
    pub quote_locktime_secs: u64,
    /// Retention window for terminal swaps, seconds.
    pub retention_secs: u64,
}

impl Default for SettlementSection {
    fn default() -> Self {
        let defaults = bt_05_settlement::SettlementConfig::default();
        Self {
            run_coordinator: true,
            base_locktime_secs: defaults.base_locktime_secs,
            quote_locktime_secs: defaults.quote_locktime_secs,
            retention_secs: defaults.retention_secs,
        }
    }
}

impl From<&SettlementSection> for bt_05_settlement::SettlementConfig {
    fn from(section: &SettlementSection) -> Self {
        Self {
            base_locktime_secs: section.base_locktime_secs,
            quote_locktime_secs: section.quote_locktime_secs,
            retention_secs: section.retention_secs,
            ..Self::default()
        }
    }
}

/// Identity configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// 32-byte identity key, hex. Generated fresh when absent; a real
    /// deployment loads this from the external identity store.
    pub secret_key_hex: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert!(config.settlement.run_coordinator);
        assert_eq!(config.settlement.base_locktime_secs, 24 * 3600);
        assert_eq!(config.negotiation.replay_window_secs, 300);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: NodeConfig = toml::from_str(
            r#"
            [gateway]
            bind_addr = "127.0.0.1:9000"

            [settlement]
            run_coordinator = false
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.bind_addr, "127.0.0.1:9000");
        assert!(!config.settlement.run_coordinator);
        // Untouched sections keep their defaults.
        assert!(config.network.enable_mdns);
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let config: NodeConfig = toml::from_str(
            r#"
            [network]
            listen_addr = "/ip4/127.0.0.1/tcp/1"
            some_future_knob = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.network.listen_addr, "/ip4/127.0.0.1/tcp/1");
    }
}
