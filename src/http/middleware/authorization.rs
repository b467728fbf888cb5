//! Bearer-token authorization interceptor.
//!
//! # Responsibilities
//! - Extract the bearer token from `Authorization`
//! - Resolve it through a [`TokenIntrospector`]
//! - Reject inactive tokens, or propagate the subject downstream
//!
//! # Design Decisions
//! - The downstream identity header is always removed first, so a client
//!   cannot assert an identity on a protected route
//! - Introspection failures answer 500, missing or inactive tokens 401.
//!   Rejections are recorded once, by the access log, from the error class
//! - Tokens are never logged

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{Instrument, Span};

use crate::auth::{IntrospectionError, IntrospectionResult, TokenIntrospector};
use crate::error::GatewayError;
use crate::http::middleware::{Interceptor, Next};
use crate::http::request::{RequestContext, Subject};
use crate::observability::metrics;

const BEARER: &str = "Bearer ";

pub struct Authorizer {
    realm: String,
    introspector: Arc<dyn TokenIntrospector>,
    identity_header: HeaderName,
    span: Span,
}

impl Authorizer {
    pub fn new(
        realm: impl Into<String>,
        introspector: Arc<dyn TokenIntrospector>,
        identity_header: HeaderName,
        span: Span,
    ) -> Self {
        Self {
            realm: realm.into(),
            introspector,
            identity_header,
            span,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Resolve the request's credentials to an active introspection result.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<IntrospectionResult, GatewayError> {
        let token = bearer_token(headers).ok_or(GatewayError::MissingBearer)?;

        let result = match self.introspector.introspect(token).await {
            Ok(result) => result,
            Err(e) => {
                metrics::record_introspection(&self.realm, "error");
                return Err(e.into());
            }
        };

        if !result.active {
            metrics::record_introspection(&self.realm, "inactive");
            return Err(GatewayError::TokenInactive);
        }
        if result.subject.is_empty() {
            metrics::record_introspection(&self.realm, "error");
            return Err(IntrospectionError::MissingSubject.into());
        }

        metrics::record_introspection(&self.realm, "active");
        Ok(result)
    }

    fn challenge(&self, error: GatewayError) -> Response {
        let challenge = match error {
            GatewayError::TokenInactive => {
                format!(r#"Bearer realm="{}", error="invalid_token""#, self.realm)
            }
            _ => format!(r#"Bearer realm="{}""#, self.realm),
        };
        let mut response = error.into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }

    async fn handle(&self, request: Request<Body>, next: Next<'_>) -> Response {
        let (mut parts, body) = request.into_parts();
        parts.headers.remove(&self.identity_header);

        let verdict = match self.authorize(&parts.headers).await {
            Ok(verdict) => verdict,
            Err(e @ (GatewayError::MissingBearer | GatewayError::TokenInactive)) => {
                return self.challenge(e);
            }
            Err(e) => return e.into_response(),
        };

        let Ok(identity) = HeaderValue::from_str(&verdict.subject) else {
            return GatewayError::from(IntrospectionError::MissingSubject).into_response();
        };
        parts.headers.insert(self.identity_header.clone(), identity);
        if let Some(ctx) = parts.extensions.get_mut::<RequestContext>() {
            ctx.subject = Some(verdict.subject.clone());
        }
        tracing::debug!(realm = %self.realm, subject = %verdict.subject, "Token active");

        let mut response = next.run(Request::from_parts(parts, body)).await;
        response.extensions_mut().insert(Subject(verdict.subject));
        response
    }
}

impl Interceptor for Authorizer {
    fn intercept<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        self.handle(request, next)
            .instrument(self.span.clone())
            .boxed()
    }
}

/// The token of a `Bearer` credential. The scheme match is case-sensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
