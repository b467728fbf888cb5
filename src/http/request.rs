//! Per-request context.
//!
//! # Responsibilities
//! - Carry the request ID, matched route and client address down the chain
//! - Carry the authenticated subject once authorization succeeds
//!
//! # Design Decisions
//! - Stored in request extensions; lives exactly as long as the request
//! - Request ID is assigned by the tower-http layer before routing

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, extract::ConnectInfo, http::Request};

/// Request ID header, set or propagated by the server layers.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Ephemeral state for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Label of the matched route, e.g. `GET /idp/`.
    pub route: String,
    pub client_addr: Option<SocketAddr>,
    pub received_at: Instant,
    /// Subject resolved by token introspection, if the route is protected.
    pub subject: Option<String>,
}

impl RequestContext {
    pub fn new(request: &Request<Body>, route: String) -> Self {
        Self {
            request_id: request_id(request).unwrap_or("unknown").to_string(),
            route,
            client_addr: client_addr(request),
            received_at: Instant::now(),
            subject: None,
        }
    }
}

/// Authenticated subject, attached to the response for the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(pub String);

pub fn request_id<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
}

/// Peer address of the connection, when served with connect info.
pub fn client_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
