//! Transport configuration.

/// Configuration for the peer network.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Multiaddr to listen on.
    pub listen_addr: String,
    /// Peers to dial at startup (multiaddrs with peer id suffix).
    pub bootstrap_peers: Vec<String>,
    /// Gossipsub topic for negotiation traffic.
    pub topic: String,
    /// Enable mDNS discovery on the local network.
    pub enable_mdns: bool,
    /// Identify protocol version string.
    pub protocol_version: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/0".to_string(),
            bootstrap_peers: Vec::new(),
            topic: "blacktrace/negotiation/1".to_string(),
            enable_mdns: true,
            protocol_version: "/blacktrace/1.0.0".to_string(),
        }
    }
}
