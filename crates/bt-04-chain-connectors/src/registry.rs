//! Connector registry.
//!
//! Wiring-time map from chain tag to connector. The base chain is fixed;
//! quote chains are looked up by the order's settlement chain tag.

use crate::connector::ChainConnector;
use crate::errors::ChainError;
use std::collections::HashMap;
use std::sync::Arc;

/// The connectors a node or coordinator drives.
pub struct ConnectorRegistry {
    base_tag: String,
    connectors: HashMap<String, Arc<dyn ChainConnector>>,
}

impl ConnectorRegistry {
    /// Create a registry with the base-chain connector.
    #[must_use]
    pub fn new(base: Arc<dyn ChainConnector>) -> Self {
        let base_tag = base.chain_meta().chain_id;
        let mut connectors = HashMap::new();
        connectors.insert(base_tag.clone(), base);
        Self {
            base_tag,
            connectors,
        }
    }

    /// Register a quote-chain connector under its own chain id.
    pub fn register(&mut self, connector: Arc<dyn ChainConnector>) {
        self.connectors
            .insert(connector.chain_meta().chain_id, connector);
    }

    /// The base-chain connector.
    ///
    /// # Panics
    ///
    /// Never panics; the base connector is inserted at construction.
    #[must_use]
    pub fn base(&self) -> Arc<dyn ChainConnector> {
        self.connectors
            .get(&self.base_tag)
            .cloned()
            .unwrap_or_else(|| unreachable!("base connector registered in new()"))
    }

    /// The base chain tag.
    #[must_use]
    pub fn base_tag(&self) -> &str {
        &self.base_tag
    }

    /// Look up a connector by chain tag.
    ///
    /// # Errors
    ///
    /// `ChainError::UnsupportedChain` for unknown tags.
    pub fn by_tag(&self, tag: &str) -> Result<Arc<dyn ChainConnector>, ChainError> {
        self.connectors
            .get(tag)
            .cloned()
            .ok_or_else(|| ChainError::UnsupportedChain(tag.to_string()))
    }

    /// All registered chain tags.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.connectors.keys().cloned().collect()
    }
}
