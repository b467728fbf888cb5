//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → matcher.rs (canonical path: decode unreserved escapes, refuse
//!       dot segments, empty segments and encoded separators with 400)
//!     → router.rs (route lookup on the canonical path)
//!     → matcher.rs (method filter, exact/prefix pattern, specificity)
//!     → Run matched route's middleware chain, or 404
//!
//! Route Registration (at startup):
//!     (method, pattern, chain)
//!     → Parse pattern (fails at startup, never per request)
//!     → Insert into method partition, sorted by specificity
//!     → Freeze behind Arc
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - No regex in hot path (exact and prefix matching only)
//! - Deterministic: exact beats prefix, longest prefix beats shorter

pub mod matcher;
pub mod router;

pub use matcher::{canonical_path, MethodFilter, PathError, PathPattern};
pub use router::{Route, RouteError, RouteTable, Router};
