//! Access log interceptor.
//!
//! Outermost link of every proxied route's chain. Emits exactly one record
//! per request and records request metrics. Error detail comes from the
//! [`Rejection`] extension set by [`GatewayError`](crate::error::GatewayError).
//! Latency is measured from when the router accepted the request.

use std::time::Instant;

use axum::{body::Body, http::Request, response::Response};
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{Instrument, Span};

use crate::error::Rejection;
use crate::http::middleware::{Interceptor, Next};
use crate::http::request::{request_id, RequestContext, Subject};
use crate::observability::metrics;

pub struct AccessLog {
    route: String,
    span: Span,
}

impl AccessLog {
    pub fn new(route: impl Into<String>, span: Span) -> Self {
        Self {
            route: route.into(),
            span,
        }
    }

    async fn handle(&self, request: Request<Body>, next: Next<'_>) -> Response {
        let context = request.extensions().get::<RequestContext>();
        let start = context.map_or_else(Instant::now, |ctx| ctx.received_at);
        let client = context
            .and_then(|ctx| ctx.client_addr)
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "-".to_string());
        let request_id = match context {
            Some(ctx) => ctx.request_id.clone(),
            None => request_id(&request).unwrap_or("unknown").to_string(),
        };
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = next.run(request).await;

        let status = response.status().as_u16();
        let latency_ms = start.elapsed().as_millis() as u64;
        let subject = response
            .extensions()
            .get::<Subject>()
            .map(|Subject(s)| s.as_str())
            .unwrap_or("-");

        match response.extensions().get::<Rejection>() {
            None => tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                route = %self.route,
                client = %client,
                status,
                latency_ms,
                subject,
                "Request completed"
            ),
            Some(rejection) if rejection.class.is_server_fault() => tracing::error!(
                request_id = %request_id,
                method = %method,
                path = %path,
                route = %self.route,
                client = %client,
                status,
                latency_ms,
                class = rejection.class.as_str(),
                detail = %rejection.detail,
                "Request failed"
            ),
            Some(rejection) => tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                route = %self.route,
                client = %client,
                status,
                latency_ms,
                class = rejection.class.as_str(),
                detail = %rejection.detail,
                "Request rejected"
            ),
        }

        metrics::record_request(&self.route, method.as_str(), status, start);
        response
    }
}

impl Interceptor for AccessLog {
    fn intercept<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        self.handle(request, next)
            .instrument(self.span.clone())
            .boxed()
    }
}
