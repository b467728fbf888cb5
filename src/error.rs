//! Per-request error taxonomy.
//!
//! Every failure while serving a request maps to exactly one
//! [`GatewayError`], which renders to exactly one response. Clients get a
//! short plain-text body; the detail travels in a [`Rejection`] response
//! extension so the access log can record it once.
//!
//! Startup failures are [`ConfigError`](crate::config::ConfigError) and never
//! reach this type.

use std::time::Duration;

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::auth::introspection::IntrospectionError;
use crate::routing::matcher::PathError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {method} {path}")]
    NoRoute { method: Method, path: String },

    #[error("path `{path}` rejected: {reason}")]
    InvalidPath { path: String, reason: PathError },

    #[error("missing or malformed bearer credentials")]
    MissingBearer,

    #[error("token is not active")]
    TokenInactive,

    #[error("token introspection failed: {0}")]
    IntrospectionFailed(#[from] IntrospectionError),

    #[error("upstream `{backend}` request failed: {detail}")]
    UpstreamFailed { backend: String, detail: String },

    #[error("upstream `{backend}` did not respond within {timeout:?}")]
    UpstreamTimeout { backend: String, timeout: Duration },

    #[error("path `{path}` is not under strip prefix `{prefix}`")]
    Misrouted { path: String, prefix: String },

    #[error("could not build upstream request: {0}")]
    InvalidUpstreamRequest(String),
}

/// Coarse error class, used to pick log level and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    AuthRejected,
    UpstreamUnavailable,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Client => "client_error",
            ErrorClass::AuthRejected => "auth_rejected",
            ErrorClass::UpstreamUnavailable => "upstream_unavailable",
            ErrorClass::Internal => "internal",
        }
    }

    /// True when the fault is ours or an upstream's, not the client's.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, ErrorClass::UpstreamUnavailable | ErrorClass::Internal)
    }
}

/// Attached to error responses so the access log can explain them.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub class: ErrorClass,
    pub detail: String,
}

impl GatewayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::NoRoute { .. }
            | GatewayError::InvalidPath { .. }
            | GatewayError::MissingBearer => ErrorClass::Client,
            GatewayError::TokenInactive => ErrorClass::AuthRejected,
            GatewayError::IntrospectionFailed(_)
            | GatewayError::UpstreamFailed { .. }
            | GatewayError::UpstreamTimeout { .. } => ErrorClass::UpstreamUnavailable,
            GatewayError::Misrouted { .. } | GatewayError::InvalidUpstreamRequest(_) => {
                ErrorClass::Internal
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRoute { .. } => StatusCode::NOT_FOUND,
            GatewayError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            GatewayError::MissingBearer | GatewayError::TokenInactive => StatusCode::UNAUTHORIZED,
            GatewayError::IntrospectionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Misrouted { .. } | GatewayError::InvalidUpstreamRequest(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing body. Never includes upstream or configuration details.
    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::NoRoute { .. } => "Not Found",
            GatewayError::InvalidPath { .. } => "Bad Request",
            GatewayError::MissingBearer | GatewayError::TokenInactive => "Unauthorized",
            GatewayError::IntrospectionFailed(_) => "Authorization Unavailable",
            GatewayError::UpstreamFailed { .. } => "Bad Gateway",
            GatewayError::UpstreamTimeout { .. } => "Gateway Timeout",
            GatewayError::Misrouted { .. } | GatewayError::InvalidUpstreamRequest(_) => {
                "Internal Server Error"
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message()).into_response();
        response.extensions_mut().insert(Rejection {
            class: self.class(),
            detail: self.to_string(),
        });
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        let cases = [
            (
                GatewayError::NoRoute {
                    method: Method::GET,
                    path: "/x".into(),
                },
                StatusCode::NOT_FOUND,
                ErrorClass::Client,
            ),
            (GatewayError::MissingBearer, StatusCode::UNAUTHORIZED, ErrorClass::Client),
            (
                GatewayError::InvalidPath {
                    path: "/a//b".into(),
                    reason: PathError::EmptySegment,
                },
                StatusCode::BAD_REQUEST,
                ErrorClass::Client,
            ),
            (
                GatewayError::TokenInactive,
                StatusCode::UNAUTHORIZED,
                ErrorClass::AuthRejected,
            ),
            (
                GatewayError::IntrospectionFailed(IntrospectionError::Timeout(Duration::from_secs(1))),
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorClass::UpstreamUnavailable,
            ),
            (
                GatewayError::UpstreamFailed {
                    backend: "b".into(),
                    detail: "refused".into(),
                },
                StatusCode::BAD_GATEWAY,
                ErrorClass::UpstreamUnavailable,
            ),
            (
                GatewayError::UpstreamTimeout {
                    backend: "b".into(),
                    timeout: Duration::from_secs(3),
                },
                StatusCode::GATEWAY_TIMEOUT,
                ErrorClass::UpstreamUnavailable,
            ),
            (
                GatewayError::Misrouted {
                    path: "/a".into(),
                    prefix: "/b".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorClass::Internal,
            ),
        ];

        for (error, status, class) in cases {
            assert_eq!(error.status(), status, "{error}");
            assert_eq!(error.class(), class, "{error}");
        }
    }

    #[tokio::test]
    async fn response_hides_detail_but_carries_rejection() {
        let response = GatewayError::UpstreamFailed {
            backend: "mobile".into(),
            detail: "connection refused (10.0.0.7:8080)".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let rejection = response.extensions().get::<Rejection>().cloned().unwrap();
        assert_eq!(rejection.class, ErrorClass::UpstreamUnavailable);
        assert!(rejection.detail.contains("10.0.0.7"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Bad Gateway");
    }
}
