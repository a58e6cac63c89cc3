//! # Identifiers
//!
//! Order, proposal and peer identifiers. All are ordered strings so that
//! lexicographic comparison is meaningful: order ids sort by creation time,
//! proposal ids sort by (order, proposal time). The negotiation engine
//! relies on this to break acceptance races deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the order component and the nanotimestamp component
/// of a proposal id.
const PROPOSAL_ID_SEP: char = '/';

/// Identifier of an order.
///
/// Monotonic string keyed on creation time (`ord-<unix_nanos>`), so
/// lexicographic order follows creation order for ids minted by one node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Mint an order id from a creation timestamp in unix nanoseconds.
    #[must_use]
    pub fn from_nanos(nanos: u128) -> Self {
        Self(format!("ord-{nanos:024}"))
    }

    /// Wrap an id received from the wire.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a proposal: `<order_id>/<unix_nanos>`.
///
/// The embedded order id gives every proposal a back-pointer; the
/// nanotimestamp suffix makes concurrent proposals on one order compare
/// deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

impl ProposalId {
    /// Derive a proposal id for `order` at proposal time `nanos`.
    #[must_use]
    pub fn derive(order: &OrderId, nanos: u128) -> Self {
        Self(format!("{}{}{nanos:024}", order.as_str(), PROPOSAL_ID_SEP))
    }

    /// Wrap an id received from the wire.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The order this proposal belongs to.
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        match self.0.rsplit_once(PROPOSAL_ID_SEP) {
            Some((order, _)) => OrderId::new(order),
            None => OrderId::new(self.0.clone()),
        }
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque peer identifier.
///
/// The string form of the transport peer id. Carried in records instead of
/// the transport's own type so that leaf crates do not depend on the
/// networking stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerTag(String);

impl PeerTag {
    /// Wrap a peer id string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
