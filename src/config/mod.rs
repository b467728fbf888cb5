//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)             environment (+ .env)
//!     → loader.rs (parse)            → loader.rs (map legacy variables)
//!                  ↘                ↙
//!               validation.rs (semantic checks)
//!                  → GatewayConfig (validated, immutable)
//!                  → gateway composition
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppEnv, BackendConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, RealmConfig,
    RouteSpec, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
