//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files; the
//! environment loader produces the same structure.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::routing::MethodFilter;

/// Identity header set from the introspected subject.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-wayru-connect-id";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deployment environment; selects the log format.
    pub app_env: AppEnv,

    /// Name used in the `Via` header.
    pub gateway_name: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Identity provider realms, by name. Routes refer to these names.
    pub realms: BTreeMap<String, RealmConfig>,

    /// Backend services, in registration order.
    pub backends: Vec<BackendConfig>,
}

impl GatewayConfig {
    pub fn gateway_name(&self) -> &str {
        if self.gateway_name.is_empty() {
            env!("CARGO_PKG_NAME")
        } else {
            &self.gateway_name
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Local,
    Dev,
    Prod,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Local => "local",
            AppEnv::Dev => "dev",
            AppEnv::Prod => "prod",
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(AppEnv::Local),
            "dev" => Ok(AppEnv::Dev),
            "prod" => Ok(AppEnv::Prod),
            other => Err(format!("unknown environment `{other}` (expected local, dev or prod)")),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4050").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4050".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time to wait for an upstream's response head, in seconds.
    pub upstream_secs: u64,

    /// Time allowed for one introspection call, in seconds.
    pub introspection_secs: u64,

    /// Overall request timeout in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            introspection_secs: 10,
            request_secs: 60,
            idle_secs: 90,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level override (trace, debug, info, warn, error). Defaults per environment.
    pub log_level: Option<String>,

    /// Prometheus exporter bind address. No exporter when unset.
    pub metrics_address: Option<String>,
}

/// Token introspection settings for one identity provider realm.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Base URL of the identity provider.
    pub introspection_url: String,

    /// Realm name in the identity provider.
    pub realm: String,

    pub client_id: String,

    #[serde(skip_serializing)]
    pub client_secret: String,

    /// Header that carries the subject to upstreams.
    pub identity_header: String,

    /// Cache active introspection results for this many seconds. 0 disables caching.
    pub cache_ttl_secs: u64,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            introspection_url: String::new(),
            realm: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            cache_ttl_secs: 0,
        }
    }
}

impl fmt::Debug for RealmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmConfig")
            .field("introspection_url", &self.introspection_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("identity_header", &self.identity_header)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .finish()
    }
}

/// Backend service definition.
#[derive(Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier, used in logs and metrics.
    pub name: String,

    /// Upstream base URL (e.g., "http://idp.internal:8080/api").
    #[serde(default)]
    pub target: String,

    /// Service credential sent as `X-API-Key`.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Path prefix removed before forwarding (e.g., "/idp").
    #[serde(default)]
    pub strip_prefix: String,

    /// Do not add X-Forwarded-* or Via headers.
    #[serde(default)]
    pub suppress_forwarded_headers: bool,

    /// Fixed `Host` header for upstream requests.
    #[serde(default)]
    pub override_host: Option<String>,

    /// Extra headers injected into every upstream request.
    #[serde(default, skip_serializing)]
    pub headers: BTreeMap<String, String>,

    /// Routes served by this backend.
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

impl BackendConfig {
    /// A backend needs both a target and a credential to be served.
    pub fn is_enabled(&self) -> bool {
        !self.target.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("api_key", &"<redacted>")
            .field("strip_prefix", &self.strip_prefix)
            .field("suppress_forwarded_headers", &self.suppress_forwarded_headers)
            .field("override_host", &self.override_host)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("routes", &self.routes)
            .finish()
    }
}

/// One route of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteSpec {
    /// Method filters. Empty or omitted means any method.
    #[serde(default = "default_methods")]
    pub methods: Vec<MethodFilter>,

    /// Exact path, or a prefix when it ends with '/'.
    pub path: String,

    /// Realm that authorizes this route. Unprotected when omitted.
    #[serde(default)]
    pub realm: Option<String>,
}

impl RouteSpec {
    pub fn new(methods: Vec<MethodFilter>, path: impl Into<String>, realm: Option<&str>) -> Self {
        Self {
            methods,
            path: path.into(),
            realm: realm.map(str::to_string),
        }
    }

    pub fn methods(&self) -> &[MethodFilter] {
        if self.methods.is_empty() {
            &[MethodFilter::Any]
        } else {
            &self.methods
        }
    }
}

fn default_methods() -> Vec<MethodFilter> {
    vec![MethodFilter::Any]
}
