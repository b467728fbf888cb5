//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing realms)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check every route lies under its backend's strip prefix
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Disabled backends are not validated; they register no routes

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::http::forwarder::strip_path_prefix;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener bind address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("metrics address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("backend name `{0}` is used more than once")]
    DuplicateBackend(String),

    #[error("backend `{backend}` target is invalid: {reason}")]
    InvalidTarget { backend: String, reason: String },

    #[error("backend `{backend}` strip prefix `{prefix}` must start with '/'")]
    InvalidStripPrefix { backend: String, prefix: String },

    #[error("backend `{backend}` route `{path}` is not under strip prefix `{prefix}`")]
    PrefixMismatch {
        backend: String,
        path: String,
        prefix: String,
    },

    #[error("backend `{backend}` route `{path}` references unknown realm `{realm}`")]
    UnknownRealm {
        backend: String,
        path: String,
        realm: String,
    },

    #[error("backend `{backend}` header `{header}` is not a valid header")]
    InvalidHeader { backend: String, header: String },

    #[error("realm `{realm}` is missing `{field}`")]
    MissingRealmField { realm: String, field: &'static str },

    #[error("realm `{realm}` introspection URL is invalid: {reason}")]
    InvalidRealmUrl { realm: String, reason: String },

    #[error("realm `{realm}` identity header `{header}` is not a valid header name")]
    InvalidIdentityHeader { realm: String, header: String },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(addr.clone()));
        }
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("upstream_secs", timeouts.upstream_secs),
        ("introspection_secs", timeouts.introspection_secs),
        ("request_secs", timeouts.request_secs),
        ("idle_secs", timeouts.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    for (name, realm) in &config.realms {
        for (field, value) in [
            ("introspection_url", &realm.introspection_url),
            ("realm", &realm.realm),
            ("client_id", &realm.client_id),
            ("client_secret", &realm.client_secret),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::MissingRealmField {
                    realm: name.clone(),
                    field,
                });
            }
        }
        if !realm.introspection_url.trim().is_empty() {
            if let Err(reason) = check_url(&realm.introspection_url, &["http", "https"]) {
                errors.push(ValidationError::InvalidRealmUrl {
                    realm: name.clone(),
                    reason,
                });
            }
        }
        if HeaderName::from_bytes(realm.identity_header.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidIdentityHeader {
                realm: name.clone(),
                header: realm.identity_header.clone(),
            });
        }
    }

    let mut names = HashSet::new();
    for backend in &config.backends {
        if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        if !backend.is_enabled() {
            continue;
        }

        if let Err(reason) = check_url(&backend.target, &["http"]) {
            errors.push(ValidationError::InvalidTarget {
                backend: backend.name.clone(),
                reason,
            });
        }

        let prefix = &backend.strip_prefix;
        if !prefix.is_empty() && !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidStripPrefix {
                backend: backend.name.clone(),
                prefix: prefix.clone(),
            });
        }

        for (name, value) in &backend.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                errors.push(ValidationError::InvalidHeader {
                    backend: backend.name.clone(),
                    header: name.clone(),
                });
            }
        }

        for route in &backend.routes {
            if strip_path_prefix(&route.path, prefix).is_none() {
                errors.push(ValidationError::PrefixMismatch {
                    backend: backend.name.clone(),
                    path: route.path.clone(),
                    prefix: prefix.clone(),
                });
            }
            if let Some(realm) = &route.realm {
                if !config.realms.contains_key(realm) {
                    errors.push(ValidationError::UnknownRealm {
                        backend: backend.name.clone(),
                        path: route.path.clone(),
                        realm: realm.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(raw: &str, schemes: &[&str]) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!("scheme `{}` is not supported", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".into());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("must not carry a query or fragment".into());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, RealmConfig, RouteSpec};
    use crate::routing::MethodFilter;
    use std::collections::BTreeMap;

    fn realm() -> RealmConfig {
        RealmConfig {
            introspection_url: "http://keycloak:8080".into(),
            realm: "wayru".into(),
            client_id: "gateway".into(),
            client_secret: "secret".into(),
            ..RealmConfig::default()
        }
    }

    fn backend(name: &str, target: &str, prefix: &str, routes: Vec<RouteSpec>) -> BackendConfig {
        BackendConfig {
            name: name.into(),
            target: target.into(),
            api_key: "key".into(),
            strip_prefix: prefix.into(),
            suppress_forwarded_headers: false,
            override_host: None,
            headers: BTreeMap::new(),
            routes,
        }
    }

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.realms.insert("users".into(), realm());
        config.backends.push(backend(
            "idp",
            "http://idp:3000",
            "/idp",
            vec![
                RouteSpec::new(vec![MethodFilter::Get], "/idp/", None),
                RouteSpec::new(vec![MethodFilter::Get], "/idp/profiles/token", Some("users")),
            ],
        ));
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.listener.bind_address = "nowhere".into();
        config.timeouts.upstream_secs = 0;
        config.backends.push(backend(
            "mobile",
            "https://mobile",
            "/mobile-api",
            vec![RouteSpec::new(vec![MethodFilter::Any], "/mobile/", Some("ops"))],
        ));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidBindAddress("nowhere".into())));
        assert!(errors.contains(&ValidationError::ZeroTimeout("upstream_secs")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidTarget { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::PrefixMismatch { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownRealm { .. })));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn prefix_must_end_at_a_segment_boundary() {
        let mut config = valid();
        config.backends[0]
            .routes
            .push(RouteSpec::new(vec![MethodFilter::Get], "/idpx/", None));
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::PrefixMismatch { .. }));
    }

    #[test]
    fn disabled_backends_are_skipped() {
        let mut config = valid();
        let mut network = backend("network", "not a url", "/network-api", Vec::new());
        network.api_key.clear();
        config.backends.push(network);
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn realm_fields_are_required() {
        let mut config = valid();
        config.realms.get_mut("users").unwrap().client_secret.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingRealmField {
                realm: "users".into(),
                field: "client_secret",
            }]
        );
    }
}
