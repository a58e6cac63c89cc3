//! # Peer-Key Cache
//!
//! Pinned verification keys by peer id. The transport already
//! authenticates peers; this cache exists to surface off-protocol key
//! changes to the user, not to gate traffic. A rotation is accepted when
//! the new signature validates, and a warning is emitted exactly once per
//! rotation.

use crate::identity::IdentityPublicKey;
use parking_lot::RwLock;
use shared_types::PeerTag;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of observing a signer key for a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    /// No key was pinned for this peer; it is now.
    FirstSeen,
    /// The key matches the pinned one.
    Unchanged,
    /// The key differs from the pinned one; the pin rotated.
    Changed {
        /// The previously pinned key.
        previous: IdentityPublicKey,
    },
}

#[derive(Clone, Copy, Debug)]
struct PinnedKey {
    key: IdentityPublicKey,
    first_seen: u64,
}

/// Advisory cache of last-seen verification keys.
///
/// Reads vastly dominate writes, so this sits behind a readers/writer
/// lock rather than an owner task.
#[derive(Default)]
pub struct PeerKeyCache {
    pinned: RwLock<HashMap<PeerTag, PinnedKey>>,
}

impl PeerKeyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a validated signer key for `peer`.
    ///
    /// Callers must only pass keys whose signature already verified; the
    /// cache trusts its input and reports what changed.
    pub fn observe(&self, peer: &PeerTag, key: IdentityPublicKey, now: u64) -> KeyEvent {
        let mut pinned = self.pinned.write();
        match pinned.get_mut(peer) {
            None => {
                pinned.insert(
                    peer.clone(),
                    PinnedKey {
                        key,
                        first_seen: now,
                    },
                );
                debug!(peer = %peer, "key_first_seen");
                KeyEvent::FirstSeen
            }
            Some(entry) if entry.key == key => KeyEvent::Unchanged,
            Some(entry) => {
                let previous = entry.key;
                entry.key = key;
                entry.first_seen = now;
                warn!(peer = %peer, "key_changed: peer rotated its signing key");
                KeyEvent::Changed { previous }
            }
        }
    }

    /// The currently pinned key for `peer`, if any.
    #[must_use]
    pub fn pinned_key(&self, peer: &PeerTag) -> Option<IdentityPublicKey> {
        self.pinned.read().get(peer).map(|p| p.key)
    }

    /// When the current pin for `peer` was first observed.
    #[must_use]
    pub fn first_seen(&self, peer: &PeerTag) -> Option<u64> {
        self.pinned.read().get(peer).map(|p| p.first_seen)
    }

    /// Number of pinned peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pinned.read().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pinned.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeyPair;

    fn key() -> IdentityPublicKey {
        IdentityKeyPair::generate().public_key()
    }

    #[test]
    fn test_first_seen_pins() {
        let cache = PeerKeyCache::new();
        let peer = PeerTag::new("p1");
        let k1 = key();

        assert_eq!(cache.observe(&peer, k1, 100), KeyEvent::FirstSeen);
        assert_eq!(cache.pinned_key(&peer), Some(k1));
        assert_eq!(cache.first_seen(&peer), Some(100));
    }

    #[test]
    fn test_same_key_is_unchanged() {
        let cache = PeerKeyCache::new();
        let peer = PeerTag::new("p1");
        let k1 = key();

        cache.observe(&peer, k1, 100);
        assert_eq!(cache.observe(&peer, k1, 200), KeyEvent::Unchanged);
        // first_seen is preserved when nothing changed.
        assert_eq!(cache.first_seen(&peer), Some(100));
    }

    #[test]
    fn test_rotation_emits_changed_once() {
        let cache = PeerKeyCache::new();
        let peer = PeerTag::new("p1");
        let k1 = key();
        let k2 = key();

        cache.observe(&peer, k1, 100);
        assert_eq!(
            cache.observe(&peer, k2, 200),
            KeyEvent::Changed { previous: k1 }
        );
        // The pin rotated; observing k2 again is quiet.
        assert_eq!(cache.observe(&peer, k2, 300), KeyEvent::Unchanged);
        assert_eq!(cache.pinned_key(&peer), Some(k2));
    }

    #[test]
    fn test_peers_are_independent() {
        let cache = PeerKeyCache::new();
        let k1 = key();
        cache.observe(&PeerTag::new("p1"), k1, 100);

        assert_eq!(cache.pinned_key(&PeerTag::new("p2")), None);
        assert_eq!(cache.len(), 1);
    }
}
