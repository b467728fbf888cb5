//! Gateway assembly.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → validate
//!     → one OidcIntrospector per realm (shared reqwest client)
//!     → composition.rs (forwarders, chains, route table)
//!     → Gateway { Arc<Router> } → http::server
//! ```

pub mod composition;
pub mod health;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{OidcIntrospector, TokenIntrospector};
use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::http::forwarder::build_client;
use crate::routing::Router;

/// A composed gateway, ready to serve.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    router: Arc<Router>,
}

impl Gateway {
    /// Compose a gateway that introspects tokens against the configured realms.
    pub fn build(config: GatewayConfig) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.timeouts.introspection_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .pool_idle_timeout(Duration::from_secs(config.timeouts.idle_secs))
            .build()?;

        let introspectors = config
            .realms
            .iter()
            .map(|(name, realm)| {
                let introspector = OidcIntrospector::new(realm, http.clone(), timeout);
                tracing::debug!(realm = %name, endpoint = introspector.endpoint(), "Introspector configured");
                (name.clone(), Arc::new(introspector) as Arc<dyn TokenIntrospector>)
            })
            .collect();

        Self::with_introspectors(config, introspectors)
    }

    /// Compose a gateway with caller-supplied introspectors, keyed by realm name.
    pub fn with_introspectors(
        config: GatewayConfig,
        introspectors: HashMap<String, Arc<dyn TokenIntrospector>>,
    ) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let client = build_client(&config.timeouts);
        let router = composition::compose(&config, &introspectors, client)?;
        tracing::info!(routes = router.table().len(), "Gateway composed");

        Ok(Self {
            config: Arc::new(config),
            router: Arc::new(router),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }
}
