//! Reverse-proxy forwarding to one upstream.
//!
//! # Responsibilities
//! - Rewrite the inbound URI onto the backend's base URL
//! - Prepare outbound headers (hop-by-hop, forwarding, Host, injected)
//! - Issue exactly one upstream request and stream the response back
//! - Hand protocol upgrades off to the tunnel task
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → strip prefix, join base path, keep query
//!     → strip hop-by-hop → X-Forwarded-*/Via → Host → injected headers
//!     → hyper client (timeout on response head)
//!     → strip hop-by-hop → Response<Body> (streamed)
//! ```
//!
//! # Design Decisions
//! - Bodies are streamed in both directions, never buffered
//! - No retries: a failed upstream call is a 502, a slow one a 504
//! - Injected headers are applied last, so they always win

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header, uri::Authority, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri,
        Version,
    },
    response::{IntoResponse, Response},
};
use futures_util::future::{BoxFuture, FutureExt};
use hyper::upgrade::OnUpgrade;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tracing::{Instrument, Span};
use url::Url;

use crate::config::{BackendConfig, ConfigError, TimeoutConfig};
use crate::error::GatewayError;
use crate::http::middleware::Handler;
use crate::http::websocket;
use crate::observability::metrics;
use crate::security::headers::{append_forwarded, set_upgrade, strip_hop_by_hop, upgrade_protocol};

/// Header carrying the backend service credential.
pub const X_API_KEY: &str = "x-api-key";

/// Pooled upstream client shared by every forwarder.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the shared upstream client.
pub fn build_client(timeouts: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
        .build(connector)
}

/// How one backend's requests are rewritten. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    authority: Authority,
    base_path: String,
    strip_prefix: String,
    injected_headers: HeaderMap,
    suppress_forwarded_headers: bool,
    override_host: Option<HeaderValue>,
    timeout: Duration,
    via: HeaderValue,
}

impl ProxyConfig {
    pub fn from_backend(
        backend: &BackendConfig,
        gateway_name: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Backend {
            backend: backend.name.clone(),
            reason,
        };

        let target = Url::parse(&backend.target).map_err(|e| invalid(e.to_string()))?;
        if target.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme `{}`", target.scheme())));
        }
        let host = target
            .host_str()
            .ok_or_else(|| invalid("target has no host".into()))?;
        let authority = match target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority).map_err(|e| invalid(e.to_string()))?;

        let mut injected_headers = HeaderMap::new();
        if !backend.api_key.is_empty() {
            let key = HeaderValue::from_str(&backend.api_key)
                .map_err(|_| invalid("api key is not a valid header value".into()))?;
            injected_headers.insert(X_API_KEY, key);
        }
        for (name, value) in &backend.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| invalid(format!("invalid header name `{name}`")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("invalid value for header `{name}`")))?;
            injected_headers.insert(name, value);
        }

        let override_host = backend
            .override_host
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| invalid("override host is not a valid header value".into()))?;

        let via = HeaderValue::from_str(&format!("1.1 {gateway_name}"))
            .map_err(|_| invalid(format!("gateway name `{gateway_name}` is not header-safe")))?;

        Ok(Self {
            authority,
            base_path: target.path().trim_end_matches('/').to_string(),
            strip_prefix: backend.strip_prefix.clone(),
            injected_headers,
            suppress_forwarded_headers: backend.suppress_forwarded_headers,
            override_host,
            timeout,
            via,
        })
    }

    pub fn strip_prefix(&self) -> &str {
        &self.strip_prefix
    }

    /// Upstream URI for an inbound path and query.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
        let rest = strip_path_prefix(path, &self.strip_prefix).ok_or_else(|| GatewayError::Misrouted {
            path: path.to_string(),
            prefix: self.strip_prefix.clone(),
        })?;

        let mut path_and_query = format!("{}{}", self.base_path, rest);
        if let Some(query) = query {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Uri::builder()
            .scheme("http")
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GatewayError::InvalidUpstreamRequest(e.to_string()))
    }
}

/// Remove `prefix` from `path` at a segment boundary. An empty remainder becomes `/`.
///
/// Returns `None` when `path` is not under `prefix`. An empty or `/` prefix
/// leaves the path unchanged.
pub fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Forwards requests to one backend.
pub struct Forwarder {
    backend: String,
    config: ProxyConfig,
    client: HttpClient,
    span: Span,
}

impl Forwarder {
    pub fn new(backend: impl Into<String>, config: ProxyConfig, client: HttpClient, span: Span) -> Self {
        Self {
            backend: backend.into(),
            config,
            client,
            span,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Relay one request to the upstream and its response back.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response, GatewayError> {
        let (mut parts, body) = request.into_parts();
        let uri = self
            .config
            .upstream_uri(parts.uri.path(), parts.uri.query())?;

        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let upgrade = upgrade_protocol(&parts.headers)
            .and_then(|protocol| Some((protocol, parts.extensions.remove::<OnUpgrade>()?)));

        let mut headers = std::mem::take(&mut parts.headers);
        strip_hop_by_hop(&mut headers);
        if !self.config.suppress_forwarded_headers {
            append_forwarded(&mut headers, client_ip, &self.config.via);
        }
        headers.remove(header::HOST);
        if let Some(host) = &self.config.override_host {
            headers.insert(header::HOST, host.clone());
        }
        for name in self.config.injected_headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.config.injected_headers {
            headers.append(name.clone(), value.clone());
        }

        let client_upgrade = match upgrade {
            Some((protocol, on_upgrade)) => {
                set_upgrade(&mut headers, protocol);
                Some(on_upgrade)
            }
            None => None,
        };

        tracing::debug!(method = %parts.method, upstream = %uri, "Forwarding request");

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.version_mut() = Version::HTTP_11;
        *outbound.headers_mut() = headers;

        let mut response = match tokio::time::timeout(self.config.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::record_upstream_error(&self.backend, "request");
                return Err(GatewayError::UpstreamFailed {
                    backend: self.backend.clone(),
                    detail: error_chain(&e),
                });
            }
            Err(_) => {
                metrics::record_upstream_error(&self.backend, "timeout");
                return Err(GatewayError::UpstreamTimeout {
                    backend: self.backend.clone(),
                    timeout: self.config.timeout,
                });
            }
        };

        let switching = response.status() == StatusCode::SWITCHING_PROTOCOLS;
        if switching {
            match client_upgrade {
                Some(client) => {
                    let upstream = hyper::upgrade::on(&mut response);
                    websocket::spawn_tunnel(client, upstream, self.backend.clone(), Span::current());
                }
                None => tracing::warn!("Upstream switched protocols without an upgrade request"),
            }
        }

        let (mut parts, body) = response.into_parts();
        let protocol = switching.then(|| upgrade_protocol(&parts.headers)).flatten();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(protocol) = protocol {
            set_upgrade(&mut parts.headers, protocol);
        }

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Handler for Forwarder {
    fn call(&self, request: Request<Body>) -> BoxFuture<'_, Response> {
        async move {
            match self.forward(request).await {
                Ok(response) => response,
                Err(e) => {
                    if e.class().is_server_fault() {
                        tracing::debug!(error = %e, "Forwarding failed");
                    }
                    e.into_response()
                }
            }
        }
        .instrument(self.span.clone())
        .boxed()
    }
}

/// Render an error with its sources, e.g. `client error (Connect): tcp connect error: Connection refused`.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
