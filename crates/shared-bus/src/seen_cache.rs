//! # Time-Bounded Seen Cache
//!
//! Consumer-side duplicate suppression for at-least-once delivery.
//!
//! Retained replay plus live fan-out means the same logical record can
//! reach a consumer more than once. Handlers that are not naturally
//! idempotent record message ids here; entries are garbage-collected
//! after the validity window so memory stays bounded.

use std::collections::HashMap;
use uuid::Uuid;

/// Cache of recently seen message ids.
pub struct SeenCache {
    /// Map of message id -> time first seen.
    seen: HashMap<Uuid, u64>,

    /// How long an id stays in the cache.
    validity_window_secs: u64,

    /// Last garbage collection time.
    last_gc: u64,

    /// Garbage collection interval in seconds.
    gc_interval_secs: u64,
}

impl SeenCache {
    /// Default validity window. Comfortably wider than any redelivery gap
    /// the in-process bus can produce.
    pub const DEFAULT_VALIDITY_WINDOW: u64 = 600;

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: u64 = 30;

    /// Create a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_VALIDITY_WINDOW, Self::DEFAULT_GC_INTERVAL)
    }

    /// Create a cache with custom settings.
    #[must_use]
    pub fn with_config(validity_window_secs: u64, gc_interval_secs: u64) -> Self {
        Self {
            seen: HashMap::new(),
            validity_window_secs,
            gc_interval_secs,
            last_gc: 0,
        }
    }

    /// Record a message id at `now`.
    ///
    /// # Returns
    ///
    /// `true` if the id is new (process the message), `false` if it was
    /// already seen inside the validity window (drop the duplicate).
    pub fn first_sighting(&mut self, message_id: Uuid, now: u64) -> bool {
        self.maybe_gc(now);
        match self.seen.get(&message_id) {
            Some(_) => false,
            None => {
                self.seen.insert(message_id, now);
                true
            }
        }
    }

    /// Number of ids currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn maybe_gc(&mut self, now: u64) {
        if now.saturating_sub(self.last_gc) < self.gc_interval_secs {
            return;
        }
        let cutoff = now.saturating_sub(self.validity_window_secs);
        self.seen.retain(|_, first_seen| *first_seen > cutoff);
        self.last_gc = now;
    }
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new()
    }
}
