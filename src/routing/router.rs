//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store registered routes, partitioned by method filter
//! - Look up the most specific route for a request
//! - Run the matched route's middleware chain, or answer 404
//!
//! # Design Decisions
//! - Append-only during composition, then shared immutably via `Arc`
//! - Each partition is kept sorted by specificity, so the first match wins
//! - A method-specific route beats an `ANY` route with an equally specific pattern
//! - Explicit 404 rather than a silent default route
//! - Matching and forwarding both see the canonical path, so a protected
//!   route cannot be reached through another spelling of its path

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{uri::PathAndQuery, Method, Request, Uri},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::Span;

use crate::error::GatewayError;
use crate::http::middleware::Chain;
use crate::http::request::RequestContext;
use crate::routing::matcher::{canonical_path, MethodFilter, PathPattern, PathError, Specificity};

/// Composition-time routing errors. Never produced while serving.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route pattern is empty")]
    EmptyPattern,

    #[error("route pattern `{0}` must start with '/'")]
    MissingLeadingSlash(String),

    #[error("route pattern `{0}` contains unsupported character {1:?}")]
    UnsupportedCharacter(String, char),

    #[error("route pattern `{0}` contains a dot segment")]
    DotSegment(String),

    #[error("route pattern `{0}` is not in canonical form")]
    NonCanonical(String),

    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    #[error("route {0} {1} is already registered")]
    Duplicate(MethodFilter, String),
}

/// A registered binding of (method, pattern) to a middleware chain.
pub struct Route {
    method: MethodFilter,
    pattern: PathPattern,
    chain: Chain,
}

impl Route {
    pub fn method(&self) -> MethodFilter {
        self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Human-readable label used in logs and metrics, e.g. `GET /idp/`.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.pattern)
    }

    /// Number of interceptors wrapped around the terminal handler.
    pub fn interceptor_count(&self) -> usize {
        self.chain.len()
    }

    fn rank(&self) -> (Specificity, bool) {
        (self.pattern.specificity(), self.method != MethodFilter::Any)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("interceptors", &self.chain.len())
            .finish()
    }
}

/// Routes partitioned by method filter, each partition ordered by specificity.
#[derive(Debug, Default)]
pub struct RouteTable {
    partitions: HashMap<MethodFilter, Vec<Route>>,
}

impl RouteTable {
    fn insert(&mut self, route: Route) -> Result<(), RouteError> {
        let partition = self.partitions.entry(route.method).or_default();
        if partition.iter().any(|r| r.pattern == route.pattern) {
            return Err(RouteError::Duplicate(route.method, route.pattern.to_string()));
        }
        partition.push(route);
        // Stable sort: most specific first.
        partition.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));
        Ok(())
    }

    fn first_match(&self, filter: MethodFilter, path: &str) -> Option<&Route> {
        self.partitions
            .get(&filter)?
            .iter()
            .find(|route| route.pattern.matches(path))
    }

    /// Find the best route for a method and path.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<&Route> {
        let specific = MethodFilter::for_method(method).and_then(|f| self.first_match(f, path));
        let any = self.first_match(MethodFilter::Any, path);

        match (specific, any) {
            (Some(s), Some(a)) => Some(if s.rank() >= a.rank() { s } else { a }),
            (s, a) => s.or(a),
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All routes, most specific first, for display.
    pub fn routes(&self) -> Vec<&Route> {
        let mut all: Vec<&Route> = self.partitions.values().flatten().collect();
        all.sort_by(|a, b| {
            b.rank()
                .cmp(&a.rank())
                .then_with(|| a.pattern.as_str().cmp(b.pattern.as_str()))
                .then_with(|| a.method.as_str().cmp(b.method.as_str()))
        });
        all
    }
}

/// The gateway's request router.
pub struct Router {
    table: RouteTable,
    span: Span,
}

impl Router {
    /// Create an empty router. Dispatch events are recorded under `span`.
    pub fn new(span: Span) -> Self {
        Self {
            table: RouteTable::default(),
            span,
        }
    }

    /// Register a chain under a method filter and path pattern.
    pub fn register(
        &mut self,
        method: MethodFilter,
        pattern: &str,
        chain: Chain,
    ) -> Result<(), RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        let route = Route {
            method,
            pattern,
            chain,
        };
        let label = route.label();
        let interceptors = route.chain.len();
        self.table.insert(route)?;
        self.span.in_scope(|| tracing::debug!(route = %label, interceptors, "Route registered"));
        Ok(())
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<&Route> {
        self.table.lookup(method, path)
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Dispatch a request to its route's chain.
    pub async fn dispatch(&self, mut request: Request<Body>) -> Response {
        let method = request.method().clone();
        let raw = request.uri().path().to_string();

        let canonical = canonical_path(&raw).map(|path| path.into_owned());
        let path = match canonical {
            Ok(path) => path,
            Err(reason) => return self.reject_path(method, raw, reason),
        };
        if path != raw {
            match with_path(request.uri(), &path) {
                Some(uri) => *request.uri_mut() = uri,
                None => return self.reject_path(method, raw, PathError::InvalidEscape),
            }
        }

        let Some(route) = self.table.lookup(&method, &path) else {
            self.span.in_scope(|| tracing::warn!(method = %method, path = %path, status = 404, "No route matched"));
            return GatewayError::NoRoute { method, path }.into_response();
        };

        let context = RequestContext::new(&request, route.label());
        request.extensions_mut().insert(context);
        route.chain.run(request).await
    }

    fn reject_path(&self, method: Method, path: String, reason: PathError) -> Response {
        self.span.in_scope(|| {
            tracing::warn!(method = %method, path = %path, reason = %reason, status = 400, "Rejected non-canonical path")
        });
        GatewayError::InvalidPath { path, reason }.into_response()
    }
}

/// `uri` with its path replaced, keeping scheme, authority and query.
fn with_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse::<PathAndQuery>().ok()?);
    Uri::from_parts(parts).ok()
}
