//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::bridge::{BridgeResult, BridgeService, GatewayConfig};

/// Shared application state.
pub struct AppState {
    /// Protocol adapter.
    pub bridge: BridgeService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the backend client
    /// cannot be created.
    pub fn new(config: GatewayConfig) -> BridgeResult<Arc<Self>> {
        let bridge = BridgeService::new(config)?;
        Ok(Self::from_bridge(bridge))
    }

    /// Wrap an existing adapter.
    #[must_use]
    pub fn from_bridge(bridge: BridgeService) -> Arc<Self> {
        Arc::new(Self { bridge })
    }

    /// Bearer token required on `/v1/*`, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.bridge.config().server.bearer_token.as_deref()
    }
}
