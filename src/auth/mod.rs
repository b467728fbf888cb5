//! Bearer-token authorization support.
//!
//! # Data Flow
//! ```text
//! Authorizer (http::middleware::authorization)
//!     → TokenIntrospector (introspection.rs)
//!         → [CachedIntrospector (cache.rs), when enabled]
//!         → OidcIntrospector → POST {idp}/realms/{realm}/.../token/introspect
//! ```

pub mod cache;
pub mod introspection;

pub use cache::CachedIntrospector;
pub use introspection::{
    IntrospectionError, IntrospectionResult, OidcIntrospector, TokenIntrospector,
};
