//! API gateway library.
//!
//! Matches requests to backend services, optionally authorizes them by
//! bearer-token introspection, and proxies them upstream.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
