//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once at startup
//! - Pick the output format and default level from the deployment environment
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for dev and prod, pretty format for local development
//! - `RUST_LOG` overrides the configured level

use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::AppEnv;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        filter: String,
        #[source]
        source: ParseError,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Default level per environment.
pub fn default_level(env: AppEnv) -> &'static str {
    match env {
        AppEnv::Local | AppEnv::Dev => "debug",
        AppEnv::Prod => "info",
    }
}

/// Filter directives for a level: our crate and tower-http at `level`,
/// everything else at info.
pub fn filter_directives(level: &str) -> String {
    format!("info,api_gateway={level},tower_http={level}")
}

/// Install the global subscriber.
pub fn init(env: AppEnv, level: Option<&str>) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = filter_directives(level.unwrap_or_else(|| default_level(env)));
            EnvFilter::try_new(&directives).map_err(|source| LoggingError::Filter {
                filter: directives,
                source,
            })?
        }
    };

    let (json, pretty) = match env {
        AppEnv::Local => (None, Some(fmt::layer().pretty().with_target(true))),
        AppEnv::Dev | AppEnv::Prod => (
            Some(fmt::layer().json().with_current_span(true).with_span_list(false)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_environment() {
        assert_eq!(default_level(AppEnv::Local), "debug");
        assert_eq!(default_level(AppEnv::Dev), "debug");
        assert_eq!(default_level(AppEnv::Prod), "info");
    }

    #[test]
    fn directives_parse() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(EnvFilter::try_new(filter_directives(level)).is_ok(), "{level}");
        }
    }
}
