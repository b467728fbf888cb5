//! Header manipulation for proxied messages.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (RFC 9110 §7.6.1) in both directions
//! - Detect protocol upgrade requests
//! - Append X-Forwarded-For and Via, set X-Forwarded-Proto/Host when absent
//!
//! # Design Decisions
//! - Forwarding headers are appended, not overwritten: the first hop's
//!   X-Forwarded-Proto/Host win, later hops only extend the chains
//! - Headers named in `Connection` are treated as hop-by-hop too
//! - Non-UTF-8 values in an existing chain are dropped rather than guessed at

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

const KEEP_ALIVE: &str = "keep-alive";
const PROXY_CONNECTION: &str = "proxy-connection";

/// Lowercased tokens of every `Connection` header value.
pub fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// The requested protocol if this is an upgrade request (`Connection: upgrade`
/// plus an `Upgrade` header), e.g. `websocket`.
pub fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    if !connection_tokens(headers).iter().any(|t| t == "upgrade") {
        return None;
    }
    headers.get(header::UPGRADE).cloned()
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for token in connection_tokens(headers) {
        if let Ok(name) = HeaderName::from_bytes(token.as_bytes()) {
            headers.remove(name);
        }
    }

    for name in [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove(KEEP_ALIVE);
    headers.remove(PROXY_CONNECTION);
}

/// Restore the headers an upgrade handshake needs after stripping.
pub fn set_upgrade(headers: &mut HeaderMap, protocol: HeaderValue) {
    headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(header::UPGRADE, protocol);
}

/// Add this hop to the forwarding headers. Must run before `Host` is rewritten.
pub fn append_forwarded(headers: &mut HeaderMap, client_ip: Option<IpAddr>, via: &HeaderValue) {
    if let Some(ip) = client_ip {
        append_to_chain(headers, X_FORWARDED_FOR, &ip.to_string());
    }
    if let Ok(via) = via.to_str() {
        append_to_chain(headers, header::VIA.as_str(), via);
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    if !headers.contains_key(X_FORWARDED_HOST) {
        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }
}

fn append_to_chain(headers: &mut HeaderMap, name: &'static str, entry: &str) {
    let mut chain: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    chain.push(entry);

    if let Ok(value) = HeaderValue::from_str(&chain.join(", ")) {
        headers.insert(name, value);
    }
}
