//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, timeout, trace layers)
//!     → routing::Router (route lookup)
//!     → middleware (access log → identity scrub → authorizer)
//!     → forwarder.rs (rewrite, relay, stream back)
//!     → websocket.rs (tunnel after 101 Switching Protocols)
//! ```

pub mod forwarder;
pub mod middleware;
pub mod request;
pub mod server;
pub mod websocket;

pub use forwarder::{Forwarder, HttpClient, ProxyConfig};
pub use request::{RequestContext, X_REQUEST_ID};
pub use server::GatewayServer;
