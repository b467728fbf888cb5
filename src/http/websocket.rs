//! Upgraded connection tunnelling (WebSocket and other `Upgrade` protocols).
//!
//! # Responsibilities
//! - Wait for both sides of a `101 Switching Protocols` exchange to upgrade
//! - Copy bytes in both directions until either side closes
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Gateway ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level forwarding: frames are not parsed, so any upgrade protocol works
//! - The tunnel runs on its own task; the request task returns the 101 at once

use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tracing::{Instrument, Span};

/// Spawn a task that joins the client and upstream upgraded connections.
pub fn spawn_tunnel(client: OnUpgrade, upstream: OnUpgrade, backend: String, span: Span) {
    tokio::spawn(
        async move {
            let (client, upstream) = match tokio::try_join!(client, upstream) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(backend = %backend, error = %e, "Upgrade failed");
                    return;
                }
            };

            let mut client = TokioIo::new(client);
            let mut upstream = TokioIo::new(upstream);
            match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                Ok((to_upstream, to_client)) => {
                    tracing::debug!(backend = %backend, to_upstream, to_client, "Tunnel closed");
                }
                Err(e) => {
                    tracing::debug!(backend = %backend, error = %e, "Tunnel closed with error");
                }
            }
        }
        .instrument(span),
    );
}
