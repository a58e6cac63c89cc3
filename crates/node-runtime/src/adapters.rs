//! Port adapters between crates.

use bt_01_peer_network::NetworkHandle;
use bt_06_api_gateway::NetworkInfo;
use shared_types::PeerTag;

/// Exposes the transport handle through the gateway's read-only port.
pub struct NetworkInfoAdapter(pub NetworkHandle);

impl NetworkInfo for NetworkInfoAdapter {
    fn local_peer(&self) -> PeerTag {
        self.0.local_peer.clone()
    }

    fn peer_count(&self) -> usize {
        self.0.peer_count()
    }

    fn peers(&self) -> Vec<PeerTag> {
        self.0.connected_peers()
    }
}
