//! Builds the route table from configuration.
//!
//! Every enabled backend gets one [`Forwarder`]; every (method, path) of its
//! routes gets a chain around it:
//!
//! ```text
//! AccessLog → IdentityScrub → [Authorizer(realm)] → Forwarder
//! ```
//!
//! Authorizers are built once per realm and shared by all routes using it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;

use crate::auth::{CachedIntrospector, TokenIntrospector};
use crate::config::{ConfigError, GatewayConfig, ValidationError};
use crate::gateway::health;
use crate::http::forwarder::{strip_path_prefix, Forwarder, HttpClient, ProxyConfig};
use crate::http::middleware::{AccessLog, Authorizer, Chain, Handler, IdentityScrub, Interceptor};
use crate::routing::{MethodFilter, Router};

pub fn compose(
    config: &GatewayConfig,
    introspectors: &HashMap<String, Arc<dyn TokenIntrospector>>,
    client: HttpClient,
) -> Result<Router, ConfigError> {
    let mut router = Router::new(tracing::info_span!("router"));
    let mut authorizers = Authorizers::new(config, introspectors)?;
    let scrub: Arc<dyn Interceptor> = Arc::new(IdentityScrub::new(authorizers.identity_headers()));
    let upstream_timeout = Duration::from_secs(config.timeouts.upstream_secs);

    for backend in &config.backends {
        if !backend.is_enabled() {
            tracing::info!(backend = %backend.name, "Backend disabled: target or API key missing");
            continue;
        }

        let span = tracing::info_span!("backend", backend = %backend.name);
        let proxy = ProxyConfig::from_backend(backend, config.gateway_name(), upstream_timeout)?;
        let forwarder: Arc<dyn Handler> = Arc::new(Forwarder::new(
            backend.name.clone(),
            proxy,
            client.clone(),
            span.clone(),
        ));

        let mut registered = 0;
        for route in &backend.routes {
            if strip_path_prefix(&route.path, &backend.strip_prefix).is_none() {
                return Err(ConfigError::Backend {
                    backend: backend.name.clone(),
                    reason: format!(
                        "route `{}` is not under strip prefix `{}`",
                        route.path, backend.strip_prefix
                    ),
                });
            }

            for method in route.methods() {
                let label = format!("{method} {}", route.path);
                let mut chain = Chain::from_arc(forwarder.clone())
                    .with(AccessLog::new(label, span.clone()))
                    .with_arc(scrub.clone());
                if let Some(realm) = &route.realm {
                    chain = chain.with_arc(authorizers.get(realm)?);
                }
                router.register(*method, &route.path, chain)?;
                registered += 1;
            }
        }

        tracing::info!(
            backend = %backend.name,
            target = %backend.target,
            routes = registered,
            "Backend registered"
        );
    }

    router.register(MethodFilter::Get, health::HEALTH_PATH, health::chain())?;
    Ok(router)
}

/// One authorizer per realm, built on first use.
struct Authorizers<'a> {
    config: &'a GatewayConfig,
    introspectors: &'a HashMap<String, Arc<dyn TokenIntrospector>>,
    identity_headers: HashMap<String, HeaderName>,
    built: HashMap<String, Arc<dyn Interceptor>>,
}

impl<'a> Authorizers<'a> {
    fn new(
        config: &'a GatewayConfig,
        introspectors: &'a HashMap<String, Arc<dyn TokenIntrospector>>,
    ) -> Result<Self, ConfigError> {
        let mut identity_headers = HashMap::new();
        for (name, realm) in &config.realms {
            let header = HeaderName::from_bytes(realm.identity_header.as_bytes()).map_err(|_| {
                ConfigError::Validation(vec![ValidationError::InvalidIdentityHeader {
                    realm: name.clone(),
                    header: realm.identity_header.clone(),
                }])
            })?;
            identity_headers.insert(name.clone(), header);
        }

        Ok(Self {
            config,
            introspectors,
            identity_headers,
            built: HashMap::new(),
        })
    }

    /// Every identity header any realm may set, plus the default.
    fn identity_headers(&self) -> Vec<HeaderName> {
        let mut headers: Vec<HeaderName> = self.identity_headers.values().cloned().collect();
        headers.push(HeaderName::from_static(crate::config::schema::DEFAULT_IDENTITY_HEADER));
        headers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        headers.dedup();
        headers
    }

    fn get(&mut self, realm: &str) -> Result<Arc<dyn Interceptor>, ConfigError> {
        if let Some(authorizer) = self.built.get(realm) {
            return Ok(authorizer.clone());
        }

        let settings = self
            .config
            .realms
            .get(realm)
            .ok_or_else(|| ConfigError::MissingIntrospector(realm.to_string()))?;
        let header = self
            .identity_headers
            .get(realm)
            .cloned()
            .ok_or_else(|| ConfigError::MissingIntrospector(realm.to_string()))?;
        let mut introspector = self
            .introspectors
            .get(realm)
            .cloned()
            .ok_or_else(|| ConfigError::MissingIntrospector(realm.to_string()))?;

        if settings.cache_ttl_secs > 0 {
            introspector = Arc::new(CachedIntrospector::new(
                introspector,
                Duration::from_secs(settings.cache_ttl_secs),
            ));
        }

        let authorizer: Arc<dyn Interceptor> = Arc::new(Authorizer::new(
            settings.realm.clone(),
            introspector,
            header,
            tracing::info_span!("authorizer", realm = %realm),
        ));
        self.built.insert(realm.to_string(), authorizer.clone());
        tracing::debug!(
            realm = %realm,
            cache_ttl_secs = settings.cache_ttl_secs,
            "Authorizer built"
        );
        Ok(authorizer)
    }
}
