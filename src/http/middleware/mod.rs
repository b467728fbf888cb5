//! Per-route middleware chains.
//!
//! A [`Chain`] is an ordered, immutable list of [`Interceptor`]s wrapped
//! around a terminal [`Handler`]. It is resolved once per route at
//! composition time. Each interceptor either answers the request itself or
//! hands it to [`Next`], optionally editing the request before and the
//! response after.
//!
//! ```text
//! AccessLog → IdentityScrub → Authorizer → Forwarder
//!   (first registered runs outermost)
//! ```

pub mod authorization;
pub mod identity;
pub mod logging;

use std::future::Future;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};
use futures_util::future::{BoxFuture, FutureExt};

pub use authorization::Authorizer;
pub use identity::IdentityScrub;
pub use logging::AccessLog;

/// Terminal request handler at the end of a chain.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request<Body>) -> BoxFuture<'_, Response>;
}

/// A request interceptor.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept<'a>(&'a self, request: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// The remainder of a chain, handed to each interceptor.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain.
    pub async fn run(self, request: Request<Body>) -> Response {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    interceptors: rest,
                    handler: self.handler,
                };
                first.intercept(request, next).await
            }
            None => self.handler.call(request).await,
        }
    }
}

/// Interceptors around a terminal handler.
#[derive(Clone)]
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn Handler>,
}

impl Chain {
    pub fn new(handler: impl Handler) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Build a chain around a handler shared with other routes.
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            interceptors: Vec::new(),
            handler,
        }
    }

    /// Append an interceptor. Earlier interceptors run first.
    pub fn with(self, interceptor: impl Interceptor) -> Self {
        self.with_arc(Arc::new(interceptor))
    }

    pub fn with_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn run(&self, request: Request<Body>) -> Response {
        Next {
            interceptors: &self.interceptors,
            handler: self.handler.as_ref(),
        }
        .run(request)
        .await
    }
}

/// A [`Handler`] backed by an async function.
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async function as a terminal handler.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request<Body>) -> BoxFuture<'_, Response> {
        (self.f)(request).boxed()
    }
}
