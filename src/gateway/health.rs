//! Liveness endpoint.
//!
//! Answers `200 OK` without touching any backend or the identity provider.

use axum::{body::Body, http::Request, http::StatusCode, response::IntoResponse};

use crate::http::middleware::{handler_fn, Chain};

pub const HEALTH_PATH: &str = "/health";

pub fn chain() -> Chain {
    Chain::new(handler_fn(|_request: Request<Body>| async {
        (StatusCode::OK, "OK").into_response()
    }))
}
