//! Strips client-supplied identity headers.
//!
//! Runs on every proxied route, protected or not, so an upstream only ever
//! sees an identity header that the [`Authorizer`](super::Authorizer) set.

use axum::{body::Body, http::HeaderName, http::Request, response::Response};
use futures_util::future::{BoxFuture, FutureExt};

use crate::http::middleware::{Interceptor, Next};

pub struct IdentityScrub {
    headers: Vec<HeaderName>,
}

impl IdentityScrub {
    pub fn new(headers: Vec<HeaderName>) -> Self {
        Self { headers }
    }
}

impl Interceptor for IdentityScrub {
    fn intercept<'a>(&'a self, mut request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response> {
        for name in &self.headers {
            if request.headers_mut().remove(name).is_some() {
                tracing::debug!(header = %name, "Dropped client-supplied identity header");
            }
        }
        next.run(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::{handler_fn, Chain};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn identity_headers_do_not_reach_the_handler() {
        let chain = Chain::new(handler_fn(|req: Request<Body>| async move {
            let leaked = req.headers().contains_key("x-wayru-connect-id")
                || req.headers().contains_key("x-user-id");
            let kept = req.headers().contains_key("x-other");
            (StatusCode::OK, format!("{leaked} {kept}")).into_response()
        }))
        .with(IdentityScrub::new(vec![
            HeaderName::from_static("x-wayru-connect-id"),
            HeaderName::from_static("x-user-id"),
        ]));

        let request = Request::builder()
            .uri("/mobile-api/v1")
            .header("x-wayru-connect-id", "spoofed")
            .header("X-User-Id", "spoofed")
            .header("x-other", "1")
            .body(Body::empty())
            .unwrap();
        let response = chain.run(request).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"false true");
    }
}
