//! Shared utilities for integration tests.
//!
//! Mock upstreams and a mock identity provider run as real servers on
//! ephemeral loopback ports; the gateway is driven over the loopback too.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::{BackendConfig, GatewayConfig, RealmConfig, RouteSpec};
use api_gateway::routing::MethodFilter;
use api_gateway::{Gateway, GatewayServer, Shutdown};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Form, Json, Router,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const CLIENT_ID: &str = "gateway";
pub const CLIENT_SECRET: &str = "gateway-secret";
pub const IDENTITY_HEADER: &str = "x-wayru-connect-id";

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Upstream that answers every request with a JSON description of it.
pub struct EchoUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl EchoUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_echo_upstream() -> EchoUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .fallback(echo)
        .with_state(hits.clone());
    EchoUpstream {
        addr: serve(app).await,
        hits,
    }
}

async fn echo(State(hits): State<Arc<AtomicUsize>>, request: Request<Body>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = request.into_parts();

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &parts.headers {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or("<binary>").to_string());
    }
    let headers: BTreeMap<String, String> = headers
        .into_iter()
        .map(|(name, values)| (name, values.join(", ")))
        .collect();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Upstream that waits before answering.
pub async fn spawn_slow_upstream(delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    });
    serve(app).await
}

/// An address nothing listens on.
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Upstream that accepts any upgrade and then echoes raw bytes.
pub async fn spawn_upgrade_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let response =
                    "HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: echo\r\n\r\n";
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Identity provider stand-in. Tokens map to a subject (active) or `None` (inactive).
pub struct MockIdp {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicUsize>,
}

impl MockIdp {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct IdpState {
    tokens: Arc<HashMap<String, Option<String>>>,
    calls: Arc<AtomicUsize>,
    status: StatusCode,
}

pub async fn spawn_idp(tokens: &[(&str, Option<&str>)]) -> MockIdp {
    spawn_idp_with_status(tokens, StatusCode::OK).await
}

/// An IdP that answers every introspection with `status` when it is not 200.
pub async fn spawn_idp_with_status(tokens: &[(&str, Option<&str>)], status: StatusCode) -> MockIdp {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = IdpState {
        tokens: Arc::new(
            tokens
                .iter()
                .map(|(token, sub)| (token.to_string(), sub.map(str::to_string)))
                .collect(),
        ),
        calls: calls.clone(),
        status,
    };
    let app = Router::new()
        .route(
            "/realms/{realm}/protocol/openid-connect/token/introspect",
            post(introspect),
        )
        .with_state(state);
    MockIdp {
        addr: serve(app).await,
        calls,
    }
}

async fn introspect(
    State(state): State<IdpState>,
    Path(realm): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> axum::response::Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    if state.status != StatusCode::OK {
        return state.status.into_response();
    }
    if realm != "wayru"
        || form.get("client_id").map(String::as_str) != Some(CLIENT_ID)
        || form.get("client_secret").map(String::as_str) != Some(CLIENT_SECRET)
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized_client"}))).into_response();
    }

    let token = form.get("token").cloned().unwrap_or_default();
    match state.tokens.get(&token) {
        Some(Some(sub)) => Json(json!({
            "active": true,
            "sub": sub,
            "iat": 1_700_000_000u64,
            "exp": 4_000_000_000u64,
        }))
        .into_response(),
        _ => Json(json!({"active": false})).into_response(),
    }
}

pub fn realm(idp_url: &str) -> RealmConfig {
    RealmConfig {
        introspection_url: idp_url.to_string(),
        realm: "wayru".into(),
        client_id: CLIENT_ID.into(),
        client_secret: CLIENT_SECRET.into(),
        ..RealmConfig::default()
    }
}

pub fn backend(name: &str, target: &str, strip_prefix: &str, routes: Vec<RouteSpec>) -> BackendConfig {
    BackendConfig {
        name: name.into(),
        target: target.into(),
        api_key: format!("{name}-key"),
        strip_prefix: strip_prefix.into(),
        suppress_forwarded_headers: false,
        override_host: None,
        headers: BTreeMap::new(),
        routes,
    }
}

pub fn route(methods: &[MethodFilter], path: &str, realm: Option<&str>) -> RouteSpec {
    RouteSpec::new(methods.to_vec(), path, realm)
}

/// The IdP layout: public `GET /idp/`, protected `GET /idp/profiles/token`.
pub fn idp_backend(target: &str) -> BackendConfig {
    backend(
        "idp",
        target,
        "/idp",
        vec![
            route(&[MethodFilter::Get], "/idp/", None),
            route(&[MethodFilter::Get], "/idp/profiles/token", Some("users")),
        ],
    )
}

pub fn gateway_config(idp: &MockIdp, backends: Vec<BackendConfig>) -> GatewayConfig {
    let mut config = GatewayConfig {
        gateway_name: "test-gateway".into(),
        backends,
        ..GatewayConfig::default()
    };
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.upstream_secs = 2;
    config.timeouts.introspection_secs = 2;
    config.realms.insert("users".into(), realm(&idp.url()));
    config
}

/// A running gateway. Dropping it shuts the server down.
pub struct TestGateway {
    pub addr: SocketAddr,
    _shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = Gateway::build(config).unwrap();
    let server = GatewayServer::new(gateway);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestGateway {
        addr,
        _shutdown: shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Decode the request an echo upstream saw.
pub async fn echoed(response: reqwest::Response) -> Value {
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

/// Send raw bytes to `addr` and return whatever comes back before the peer closes.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
