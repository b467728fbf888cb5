//! Reverse-proxy behaviour through a running gateway.

mod common;

use std::time::Duration;

use api_gateway::routing::MethodFilter;
use common::*;
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CRUD: [MethodFilter; 4] = [
    MethodFilter::Get,
    MethodFilter::Post,
    MethodFilter::Put,
    MethodFilter::Delete,
];

fn mobile(target: &str) -> api_gateway::config::BackendConfig {
    backend("mobile", target, "/mobile-api", vec![route(&CRUD, "/mobile-api/", None)])
}

#[tokio::test]
async fn strips_prefix_and_keeps_query() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&upstream.url())])).await;

    let response = client()
        .get(gateway.url("/mobile-api/v1/plans?page=2&sort=asc"))
        .send()
        .await
        .unwrap();
    let body = echoed(response).await;
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/v1/plans");
    assert_eq!(body["query"], "page=2&sort=asc");
}

#[tokio::test]
async fn joins_target_base_path() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let target = format!("{}/api/", upstream.url());
    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&target)])).await;

    let body = echoed(
        client()
            .get(gateway.url("/mobile-api/v1/plans"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["path"], "/api/v1/plans");
}

#[tokio::test]
async fn streams_request_bodies() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&upstream.url())])).await;

    let response = client()
        .post(gateway.url("/mobile-api/orders"))
        .header("content-type", "application/json")
        .body(r#"{"plan":"monthly"}"#)
        .send()
        .await
        .unwrap();
    let body = echoed(response).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], r#"{"plan":"monthly"}"#);
    assert_eq!(body["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn injected_api_key_overrides_client_value() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let mut backend = mobile(&upstream.url());
    backend
        .headers
        .insert("authorization".into(), "Bearer service-credential".into());
    let gateway = spawn_gateway(gateway_config(&idp, vec![backend])).await;

    let response = client()
        .get(gateway.url("/mobile-api/me"))
        .header("x-api-key", "forged")
        .header("authorization", "Bearer client-token")
        .send()
        .await
        .unwrap();
    let body = echoed(response).await;
    assert_eq!(body["headers"]["x-api-key"], "mobile-key");
    assert_eq!(body["headers"]["authorization"], "Bearer service-credential");
}

#[tokio::test]
async fn host_is_upstream_authority_unless_overridden() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;

    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&upstream.url())])).await;
    let body = echoed(client().get(gateway.url("/mobile-api/")).send().await.unwrap()).await;
    assert_eq!(body["headers"]["host"], upstream.addr.to_string());

    let mut backend = mobile(&upstream.url());
    backend.override_host = Some("mobile.example.com".into());
    let gateway = spawn_gateway(gateway_config(&idp, vec![backend])).await;
    let body = echoed(client().get(gateway.url("/mobile-api/")).send().await.unwrap()).await;
    assert_eq!(body["headers"]["host"], "mobile.example.com");
}

#[tokio::test]
async fn appends_forwarding_headers() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&upstream.url())])).await;

    let response = client()
        .get(gateway.url("/mobile-api/"))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    let body = echoed(response).await;
    assert_eq!(body["headers"]["x-forwarded-for"], "203.0.113.9, 127.0.0.1");
    assert_eq!(body["headers"]["x-forwarded-proto"], "http");
    assert_eq!(body["headers"]["x-forwarded-host"], gateway.addr.to_string());
    assert_eq!(body["headers"]["via"], "1.1 test-gateway");
}

#[tokio::test]
async fn suppressed_forwarding_headers_are_not_added() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let mut backend = mobile(&upstream.url());
    backend.suppress_forwarded_headers = true;
    let gateway = spawn_gateway(gateway_config(&idp, vec![backend])).await;

    let body = echoed(client().get(gateway.url("/mobile-api/")).send().await.unwrap()).await;
    let headers = body["headers"].as_object().unwrap();
    assert!(!headers.contains_key("x-forwarded-for"));
    assert!(!headers.contains_key("x-forwarded-host"));
    assert!(!headers.contains_key("via"));
}

#[tokio::test]
async fn hop_by_hop_headers_are_dropped() {
    let upstream = spawn_echo_upstream().await;
    let idp = spawn_idp(&[]).await;
    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&upstream.url())])).await;

    let response = client()
        .get(gateway.url("/mobile-api/"))
        .header("connection", "keep-alive, x-session-hint")
        .header("x-session-hint", "sticky")
        .header("proxy-authorization", "Basic Zm9vOmJhcg==")
        .header("x-kept", "yes")
        .send()
        .await
        .unwrap();
    let body = echoed(response).await;
    let headers = body["headers"].as_object().unwrap();
    assert!(!headers.contains_key("x-session-hint"));
    assert!(!headers.contains_key("proxy-authorization"));
    assert_eq!(headers["x-kept"], "yes");
}

#[tokio::test]
async fn unreachable_upstream_is_502() {
    let idp = spawn_idp(&[]).await;
    let target = format!("http://{}", dead_addr());
    let gateway = spawn_gateway(gateway_config(&idp, vec![mobile(&target)])).await;

    let response = client().get(gateway.url("/mobile-api/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let text = response.text().await.unwrap();
    assert!(!text.contains("127.0.0.1"), "upstream detail leaked: {text}");
}

#[tokio::test]
async fn slow_upstream_is_504() {
    let slow = spawn_slow_upstream(Duration::from_secs(5)).await;
    let idp = spawn_idp(&[]).await;
    let mut config = gateway_config(&idp, vec![mobile(&format!("http://{slow}"))]);
    config.timeouts.upstream_secs = 1;
    let gateway = spawn_gateway(config).await;

    let response = client().get(gateway.url("/mobile-api/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn upgrades_are_tunnelled() {
    let upstream = spawn_upgrade_upstream().await;
    let idp = spawn_idp(&[]).await;
    let gateway = spawn_gateway(gateway_config(
        &idp,
        vec![mobile(&format!("http://{upstream}"))],
    ))
    .await;

    let mut stream = tokio::net::TcpStream::connect(gateway.addr).await.unwrap();
    stream
        .write_all(
            b"GET /mobile-api/stream HTTP/1.1\r\nHost: gateway\r\nConnection: Upgrade\r\nUpgrade: echo\r\n\r\n",
        )
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0, "connection closed before response head");
        head.extend_from_slice(&buf[..n]);
    }
    let head = String::from_utf8_lossy(&head).to_lowercase();
    assert!(head.starts_with("http/1.1 101"), "{head}");
    assert!(head.contains("upgrade: echo"), "{head}");

    stream.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"ping");
}
