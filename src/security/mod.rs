//! Security-relevant request hygiene.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → http::middleware::identity (drop client-asserted identity)
//!     → http::middleware::authorization (bearer token check)
//!     → headers.rs (hop-by-hop stripping, X-Forwarded-*, Via)
//!     → upstream
//! ```
//!
//! # Design Decisions
//! - No trust in client-supplied identity headers
//! - Fail closed: an unauthorizable request never reaches an upstream

pub mod headers;
