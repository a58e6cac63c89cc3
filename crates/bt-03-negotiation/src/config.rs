//! Engine configuration.

use shared_crypto::DEFAULT_REPLAY_WINDOW_SECS;

/// Configuration for the negotiation engine.
#[derive(Clone, Debug)]
pub struct NegotiationConfig {
    /// Receiver-side replay window for signed envelopes, seconds.
    pub replay_window_secs: u64,
    /// Orders with no acceptance expire after this many seconds.
    pub order_ttl_secs: u64,
    /// Expiry sweep cadence, seconds.
    pub sweep_interval_secs: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            replay_window_secs: DEFAULT_REPLAY_WINDOW_SECS,
            order_ttl_secs: 24 * 3600,
            sweep_interval_secs: 60,
        }
    }
}
