//! The libp2p swarm and its command/event surface.
//!
//! Upper layers hold a [`NetworkHandle`] and an event receiver; the
//! [`PeerNetwork`] owns the swarm and runs in a dedicated task.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{
    gossipsub, identify, mdns, noise, ping, request_response, tcp, yamux, Multiaddr, PeerId,
    StreamProtocol, Swarm,
};
use parking_lot::RwLock;
use shared_crypto::SignedEnvelope;
use shared_types::PeerTag;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::errors::NetworkError;
use crate::message::{decode_envelope, encode_envelope, DirectAck, DirectFrame};

/// Command channel depth between handle and swarm task.
const COMMAND_BUFFER: usize = 256;

/// Event channel depth between swarm task and consumer.
const EVENT_BUFFER: usize = 256;

/// Combined libp2p network behaviour for BlackTrace.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `BlacktraceBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct BlacktraceBehaviour {
    gossipsub: gossipsub::Behaviour,
    direct: request_response::cbor::Behaviour<DirectFrame, DirectAck>,
    mdns: Toggle<mdns::tokio::Behaviour>,
    identify: identify::Behaviour,
    ping: ping::Behaviour,
}

/// How an envelope arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Via gossip broadcast.
    Broadcast,
    /// Via a direct unicast stream.
    Direct,
}

/// Commands from upper layers to the swarm task.
pub enum NetworkCommand {
    /// Publish an envelope to every reachable peer, best effort.
    Broadcast {
        /// The signed envelope to gossip.
        envelope: SignedEnvelope,
    },
    /// Open a direct stream, write the framed envelopes, await the ack.
    SendDirect {
        /// Destination peer.
        peer: PeerTag,
        /// Envelopes to frame onto the stream.
        envelopes: Vec<SignedEnvelope>,
        /// Resolved on ack or failure.
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    /// Dial a peer by multiaddr.
    Dial {
        /// Address to dial.
        addr: String,
        /// Resolved once the dial is accepted or rejected locally.
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
}

/// Events surfaced to upper layers.
#[derive(Clone, Debug)]
pub enum NetworkEvent {
    /// A signed envelope arrived.
    Envelope {
        /// Transport-level sender. The envelope's signer is authoritative
        /// for identity; this is only the delivery path.
        from: PeerTag,
        /// The envelope.
        envelope: SignedEnvelope,
        /// Broadcast or direct.
        delivery: Delivery,
    },
    /// A connection to a peer was established.
    PeerConnected(PeerTag),
    /// The last connection to a peer closed.
    PeerDisconnected(PeerTag),
    /// The swarm is listening on an address.
    NewListenAddr(String),
}

/// Application-facing handle to the network task.
#[derive(Clone)]
pub struct NetworkHandle {
    command_tx: mpsc::Sender<NetworkCommand>,
    peers: Arc<RwLock<HashSet<PeerTag>>>,
    /// Local transport peer id.
    pub local_peer: PeerTag,
}

impl NetworkHandle {
    /// Queue an envelope for gossip broadcast. Best effort: delivery
    /// failures are logged by the network task, not surfaced here.
    pub async fn broadcast(&self, envelope: SignedEnvelope) -> Result<(), NetworkError> {
        self.command_tx
            .send(NetworkCommand::Broadcast { envelope })
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }

    /// Send framed envelopes over a short-lived direct stream and wait
    /// for the peer's ack.
    pub async fn send_direct(
        &self,
        peer: PeerTag,
        envelopes: Vec<SignedEnvelope>,
    ) -> Result<(), NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::SendDirect {
                peer,
                envelopes,
                reply,
            })
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)?
    }

    /// Dial a peer by multiaddr.
    pub async fn dial(&self, addr: String) -> Result<(), NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::Dial { addr, reply })
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)?
    }

    /// Currently connected peers.
    #[must_use]
    pub fn connected_peers(&self) -> Vec<PeerTag> {
        self.peers.read().iter().cloned().collect()
    }

    /// Number of currently connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }
}

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct PeerNetwork {
    swarm: Swarm<BlacktraceBehaviour>,
    topic: gossipsub::IdentTopic,
    command_rx: mpsc::Receiver<NetworkCommand>,
    event_tx: mpsc::Sender<NetworkEvent>,
    peers: Arc<RwLock<HashSet<PeerTag>>>,
    pending_direct: HashMap<request_response::OutboundRequestId, oneshot::Sender<Result<(), NetworkError>>>,
}

impl PeerNetwork {
    /// Build the network and return
    /// `(PeerNetwork, NetworkHandle, event receiver)`.
    pub fn new(
        config: &NetworkConfig,
    ) -> Result<(Self, NetworkHandle, mpsc::Receiver<NetworkEvent>), Box<dyn std::error::Error + Send + Sync>>
    {
        let topic = gossipsub::IdentTopic::new(&config.topic);
        let enable_mdns = config.enable_mdns;
        let protocol_version = config.protocol_version.clone();

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let direct = request_response::cbor::Behaviour::new(
                    [(
                        StreamProtocol::new("/blacktrace/direct/1"),
                        request_response::ProtocolSupport::Full,
                    )],
                    request_response::Config::default(),
                );

                let local_peer_id = key.public().to_peer_id();
                let mdns = if enable_mdns {
                    Some(mdns::tokio::Behaviour::new(
                        mdns::Config::default(),
                        local_peer_id,
                    )?)
                } else {
                    None
                };

                let identify = identify::Behaviour::new(identify::Config::new(
                    protocol_version.clone(),
                    key.public(),
                ));

                Ok(BlacktraceBehaviour {
                    gossipsub,
                    direct,
                    mdns: Toggle::from(mdns),
                    identify,
                    ping: ping::Behaviour::default(),
                })
            })?
            .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            match addr_str.parse::<Multiaddr>() {
                Ok(addr) => {
                    if let Err(e) = swarm.dial(addr.clone()) {
                        warn!(addr = %addr, error = %e, "bootstrap dial failed");
                    }
                }
                Err(e) => warn!(addr = %addr_str, error = %e, "bad bootstrap address"),
            }
        }

        let local_peer = PeerTag::new(swarm.local_peer_id().to_string());
        let peers = Arc::new(RwLock::new(HashSet::new()));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let network = PeerNetwork {
            swarm,
            topic,
            command_rx,
            event_tx,
            peers: peers.clone(),
            pending_direct: HashMap::new(),
        };
        let handle = NetworkHandle {
            command_tx,
            peers,
            local_peer,
        };

        Ok((network, handle, event_rx))
    }

    /// Drive the swarm event loop. Run in a dedicated tokio task; exits
    /// when every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("all network handles dropped, stopping swarm task");
                            return;
                        }
                    }
                }

                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
            }
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Broadcast { envelope } => {
                let data = match encode_envelope(&envelope) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(error = %e, "envelope encoding failed, broadcast dropped");
                        return;
                    }
                };
                if let Err(e) = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(self.topic.clone(), data)
                {
                    // Best-effort semantics: log and swallow.
                    warn!(error = %e, "gossipsub publish failed");
                }
            }

            NetworkCommand::SendDirect {
                peer,
                envelopes,
                reply,
            } => {
                let peer_id = match PeerId::from_str(peer.as_str()) {
                    Ok(id) => id,
                    Err(_) => {
                        let _ = reply.send(Err(NetworkError::InvalidPeerId(
                            peer.as_str().to_string(),
                        )));
                        return;
                    }
                };
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .direct
                    .send_request(&peer_id, DirectFrame { envelopes });
                self.pending_direct.insert(request_id, reply);
            }

            NetworkCommand::Dial { addr, reply } => {
                let result = match addr.parse::<Multiaddr>() {
                    Ok(multiaddr) => self
                        .swarm
                        .dial(multiaddr)
                        .map_err(|e| NetworkError::DialFailed(e.to_string())),
                    Err(_) => Err(NetworkError::InvalidAddress(addr)),
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<BlacktraceBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "P2P listening on");
                let _ = self
                    .event_tx
                    .send(NetworkEvent::NewListenAddr(address.to_string()))
                    .await;
            }

            SwarmEvent::Behaviour(BlacktraceBehaviourEvent::Gossipsub(
                gossipsub::Event::Message {
                    propagation_source,
                    message,
                    ..
                },
            )) => {
                let from = PeerTag::new(
                    message
                        .source
                        .unwrap_or(propagation_source)
                        .to_string(),
                );
                match decode_envelope(&message.data) {
                    Ok(envelope) => {
                        let _ = self
                            .event_tx
                            .send(NetworkEvent::Envelope {
                                from,
                                envelope,
                                delivery: Delivery::Broadcast,
                            })
                            .await;
                    }
                    Err(e) => debug!(error = %e, "failed to decode gossip message"),
                }
            }

            SwarmEvent::Behaviour(BlacktraceBehaviourEvent::Direct(
                request_response::Event::Message { peer, message, .. },
            )) => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    let from = PeerTag::new(peer.to_string());
                    for envelope in request.envelopes {
                        let _ = self
                            .event_tx
                            .send(NetworkEvent::Envelope {
                                from: from.clone(),
                                envelope,
                                delivery: Delivery::Direct,
                            })
                            .await;
                    }
                    if self
                        .swarm
                        .behaviour_mut()
                        .direct
                        .send_response(channel, DirectAck)
                        .is_err()
                    {
                        debug!(peer = %peer, "direct ack channel already closed");
                    }
                }
                request_response::Message::Response { request_id, .. } => {
                    if let Some(reply) = self.pending_direct.remove(&request_id) {
                        let _ = reply.send(Ok(()));
                    }
                }
            },

            SwarmEvent::Behaviour(BlacktraceBehaviourEvent::Direct(
                request_response::Event::OutboundFailure {
                    request_id, error, ..
                },
            )) => {
                if let Some(reply) = self.pending_direct.remove(&request_id) {
                    let _ = reply.send(Err(NetworkError::DirectSendFailed(error.to_string())));
                }
            }

            SwarmEvent::Behaviour(BlacktraceBehaviourEvent::Mdns(mdns::Event::Discovered(
                discovered,
            ))) => {
                for (peer_id, addr) in discovered {
                    debug!(peer = %peer_id, addr = %addr, "mDNS discovered peer");
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .add_explicit_peer(&peer_id);
                    self.swarm.add_peer_address(peer_id, addr);
                }
            }

            SwarmEvent::Behaviour(BlacktraceBehaviourEvent::Identify(
                identify::Event::Received { peer_id, info, .. },
            )) => {
                for addr in info.listen_addrs {
                    self.swarm.add_peer_address(peer_id, addr);
                }
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                debug!(peer = %peer_id, "connection established");
                if num_established.get() == 1 {
                    let tag = PeerTag::new(peer_id.to_string());
                    self.peers.write().insert(tag.clone());
                    let _ = self.event_tx.send(NetworkEvent::PeerConnected(tag)).await;
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                debug!(peer = %peer_id, "connection closed");
                if num_established == 0 {
                    let tag = PeerTag::new(peer_id.to_string());
                    self.peers.write().remove(&tag);
                    let _ = self
                        .event_tx
                        .send(NetworkEvent::PeerDisconnected(tag))
                        .await;
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::IdentityKeyPair;
    use tokio::time::timeout;

    fn local_config() -> NetworkConfig {
        NetworkConfig {
            listen_addr: "/ip4/127.0.0.1/tcp/0".to_string(),
            bootstrap_peers: Vec::new(),
            topic: "blacktrace/test/1".to_string(),
            enable_mdns: false,
            protocol_version: "/blacktrace/test/1.0.0".to_string(),
        }
    }

    async fn wait_listen_addr(events: &mut mpsc::Receiver<NetworkEvent>) -> String {
        loop {
            match timeout(Duration::from_secs(10), events.recv())
                .await
                .expect("listen addr timeout")
                .expect("event channel open")
            {
                NetworkEvent::NewListenAddr(addr) => return addr,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_two_nodes_broadcast_and_direct() {
        let (net_a, handle_a, mut events_a) = PeerNetwork::new(&local_config()).unwrap();
        let (net_b, handle_b, mut events_b) = PeerNetwork::new(&local_config()).unwrap();
        tokio::spawn(net_a.run());
        tokio::spawn(net_b.run());

        let addr_a = wait_listen_addr(&mut events_a).await;
        handle_b.dial(addr_a).await.unwrap();

        // Wait until both sides report the connection.
        let connected = async {
            let mut a_done = false;
            let mut b_done = false;
            while !(a_done && b_done) {
                tokio::select! {
                    Some(e) = events_a.recv() => {
                        if matches!(e, NetworkEvent::PeerConnected(_)) { a_done = true; }
                    }
                    Some(e) = events_b.recv() => {
                        if matches!(e, NetworkEvent::PeerConnected(_)) { b_done = true; }
                    }
                }
            }
        };
        timeout(Duration::from_secs(10), connected)
            .await
            .expect("connection timeout");

        // Broadcast from A until B's gossip mesh delivers one. Each retry
        // bumps the timestamp so gossipsub does not dedupe the payload.
        let keypair = IdentityKeyPair::generate();
        let received = async {
            let mut attempt = 0u64;
            loop {
                attempt += 1;
                let envelope =
                    SignedEnvelope::seal(&keypair, "order_announcement", vec![42], attempt);
                handle_a.broadcast(envelope).await.unwrap();
                match timeout(Duration::from_millis(500), events_b.recv()).await {
                    Ok(Some(NetworkEvent::Envelope {
                        envelope: got,
                        delivery,
                        ..
                    })) => {
                        assert_eq!(delivery, Delivery::Broadcast);
                        return got;
                    }
                    _ => continue,
                }
            }
        };
        let got = timeout(Duration::from_secs(20), received)
            .await
            .expect("broadcast timeout");
        assert_eq!(got.msg_type, "order_announcement");
        assert_eq!(got.payload, vec![42]);
        assert!(got.verify().is_ok());

        // Direct unicast from B to A.
        let direct = SignedEnvelope::seal(&keypair, "order_request", vec![7], 2);
        handle_b
            .send_direct(handle_a.local_peer.clone(), vec![direct.clone()])
            .await
            .unwrap();
        let got = async {
            loop {
                if let Some(NetworkEvent::Envelope {
                    envelope, delivery, ..
                }) = events_a.recv().await
                {
                    assert_eq!(delivery, Delivery::Direct);
                    return envelope;
                }
            }
        };
        let got = timeout(Duration::from_secs(10), got)
            .await
            .expect("direct timeout");
        assert_eq!(got, direct);

        assert_eq!(handle_a.peer_count(), 1);
        assert_eq!(handle_b.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_direct_to_unknown_peer_fails() {
        let (network, handle, _events) = PeerNetwork::new(&local_config()).unwrap();
        tokio::spawn(network.run());

        let err = handle
            .send_direct(PeerTag::new("not-a-peer-id"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidPeerId(_)));
    }

    #[tokio::test]
    async fn test_dial_invalid_address_fails() {
        let (network, handle, _events) = PeerNetwork::new(&local_config()).unwrap();
        tokio::spawn(network.run());

        let err = handle.dial("definitely not a multiaddr".into()).await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidAddress(_)));
    }
}
