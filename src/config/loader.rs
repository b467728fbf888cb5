//! Configuration loading from disk or the process environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{
    AppEnv, BackendConfig, GatewayConfig, ListenerConfig, RealmConfig, RouteSpec,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::{MethodFilter, RouteError};

/// Realm names used by the environment mapping.
pub const USERS_REALM: &str = "users";
pub const ADMIN_REALM: &str = "admin";

/// Error type for configuration loading and gateway composition.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} not set")]
    MissingEnv(&'static str),

    #[error("{key} is invalid: {reason}")]
    InvalidEnv { key: &'static str, reason: String },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("route registration failed: {0}")]
    Route(#[from] RouteError),

    #[error("backend `{backend}`: {reason}")]
    Backend { backend: String, reason: String },

    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("no introspector available for realm `{0}`")]
    MissingIntrospector(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

impl GatewayConfig {
    /// Build and validate configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Logging settings (`APP_ENV`, `LOG_LEVEL`) alone, so the subscriber can
    /// be installed before the rest of the environment is read.
    pub fn logging_from_env() -> Result<(AppEnv, Option<String>), ConfigError> {
        Self::logging_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn logging_from_lookup<F>(lookup: F) -> Result<(AppEnv, Option<String>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        Ok((env.app_env()?, env.optional("LOG_LEVEL")))
    }

    /// Build and validate configuration from an arbitrary variable source.
    ///
    /// Blank values count as unset. Optional backends without both a URL and a
    /// key are omitted.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let app_env = env.app_env()?;
        let port: u16 = env
            .required("PORT")?
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                key: "PORT",
                reason: "must be an integer between 0 and 65535".into(),
            })?;

        let keycloak_url = env.required("KEYCLOAK_URL")?;
        let cache_ttl_secs = match env.optional("INTROSPECTION_CACHE_TTL_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "INTROSPECTION_CACHE_TTL_SECS",
                reason: "must be a non-negative integer".into(),
            })?,
            None => 0,
        };

        let mut realms = BTreeMap::new();
        realms.insert(
            USERS_REALM.to_string(),
            RealmConfig {
                introspection_url: keycloak_url.clone(),
                realm: env.required("KEYCLOAK_REALM")?,
                client_id: env.required("KEYCLOAK_CLIENT_ID")?,
                client_secret: env.required("KEYCLOAK_CLIENT_SECRET")?,
                cache_ttl_secs,
                ..RealmConfig::default()
            },
        );

        let idp_url = env.required("IDP_SERVICE_URL")?;
        let idp_key = env.required("IDP_SERVICE_KEY")?;
        let admin_key = env.required("DASHBOARD_BACKEND_ADMIN_KEY")?;

        realms.insert(
            ADMIN_REALM.to_string(),
            RealmConfig {
                introspection_url: keycloak_url,
                realm: env.required("KEYCLOAK_ADMIN_REALM")?,
                client_id: env.required("KEYCLOAK_ADMIN_CLIENT_ID")?,
                client_secret: env.required("KEYCLOAK_ADMIN_CLIENT_SECRET")?,
                cache_ttl_secs,
                ..RealmConfig::default()
            },
        );

        let mut backends = vec![BackendConfig {
            name: "idp".into(),
            target: idp_url,
            api_key: idp_key,
            strip_prefix: "/idp".into(),
            suppress_forwarded_headers: false,
            override_host: None,
            headers: BTreeMap::new(),
            routes: vec![
                RouteSpec::new(vec![MethodFilter::Get], "/idp/", None),
                RouteSpec::new(vec![MethodFilter::Get], "/idp/profiles/token", Some(USERS_REALM)),
            ],
        }];

        if let Some((url, key)) = env.pair("MOBILE_BACKEND_URL", "MOBILE_BACKEND_KEY") {
            let parsed = url::Url::parse(&url).map_err(|e| ConfigError::InvalidEnv {
                key: "MOBILE_BACKEND_URL",
                reason: e.to_string(),
            })?;
            let override_host = parsed.host_str().map(|host| match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            });
            backends.push(BackendConfig {
                name: "mobile".into(),
                target: url,
                api_key: key,
                strip_prefix: "/mobile-api".into(),
                suppress_forwarded_headers: true,
                override_host,
                headers: BTreeMap::new(),
                routes: crud_routes("/mobile-api/", None),
            });
        }

        if let Some((url, key)) = env.pair("NETWORK_BACKEND_URL", "NETWORK_BACKEND_KEY") {
            let mut routes = crud_routes("/network-api/", Some(USERS_REALM));
            routes.extend(public_routes(env.list("NETWORK_PUBLIC_PATHS")));
            backends.push(simple_backend("network", url, key, "/network-api", routes));
        }

        if let Some((url, key)) = env.pair("DASHBOARD_BACKEND_URL", "DASHBOARD_BACKEND_KEY") {
            let mut routes = crud_routes("/dashboard-api/", Some(USERS_REALM));
            routes.extend(public_routes(env.list("DASHBOARD_PUBLIC_PATHS")));
            backends.push(simple_backend("dashboard", url.clone(), key.clone(), "/dashboard-api", routes));

            let mut admin = simple_backend(
                "admin",
                url,
                key,
                "/admin-api",
                crud_routes("/admin-api/", Some(ADMIN_REALM)),
            );
            admin
                .headers
                .insert("authorization".into(), format!("Bearer {admin_key}"));
            backends.push(admin);
        }

        let config = GatewayConfig {
            app_env,
            gateway_name: env.optional("GATEWAY_NAME").unwrap_or_default(),
            listener: ListenerConfig {
                bind_address: format!("0.0.0.0:{port}"),
            },
            observability: crate::config::ObservabilityConfig {
                log_level: env.optional("LOG_LEVEL"),
                metrics_address: env.optional("METRICS_ADDRESS"),
            },
            realms,
            backends,
            ..GatewayConfig::default()
        };

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::MissingEnv(key))
    }

    fn app_env(&self) -> Result<AppEnv, ConfigError> {
        self.required("APP_ENV")?
            .parse()
            .map_err(|reason| ConfigError::InvalidEnv { key: "APP_ENV", reason })
    }

    /// Both values, or `None` when either is unset.
    fn pair(&self, url: &str, key: &str) -> Option<(String, String)> {
        let pair = self.optional(url).zip(self.optional(key));
        if pair.is_none() {
            tracing::info!(backend_url = url, "Backend not configured, its routes are disabled");
        }
        pair
    }

    /// Comma-separated list.
    fn list(&self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn crud_routes(path: &str, realm: Option<&str>) -> Vec<RouteSpec> {
    vec![RouteSpec::new(
        vec![
            MethodFilter::Get,
            MethodFilter::Post,
            MethodFilter::Put,
            MethodFilter::Delete,
        ],
        path,
        realm,
    )]
}

fn public_routes(paths: Vec<String>) -> impl Iterator<Item = RouteSpec> {
    paths
        .into_iter()
        .map(|path| RouteSpec::new(vec![MethodFilter::Get], path, None))
}

fn simple_backend(
    name: &str,
    target: String,
    api_key: String,
    strip_prefix: &str,
    routes: Vec<RouteSpec>,
) -> BackendConfig {
    BackendConfig {
        name: name.into(),
        target,
        api_key,
        strip_prefix: strip_prefix.into(),
        suppress_forwarded_headers: false,
        override_host: None,
        headers: BTreeMap::new(),
        routes,
    }
}
