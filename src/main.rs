//! API Gateway
//!
//! A single ingress point in front of several backend services.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌────────────────────────────────────────────────────┐
//!                       │                    API GATEWAY                      │
//!                       │                                                     │
//!     Client Request    │  ┌─────────┐    ┌──────────┐    ┌───────────────┐  │
//!     ──────────────────┼─▶│  http   │───▶│ routing  │───▶│  middleware   │  │
//!                       │  │ server  │    │  router  │    │ log/scrub/auth│  │
//!                       │  └─────────┘    └──────────┘    └───────┬───────┘  │
//!                       │                                         │          │
//!                       │                     ┌───────────┐       ▼          │
//!                       │                     │   auth    │◀── Authorizer ───┼──▶ Identity
//!                       │                     │introspect │                  │    Provider
//!                       │                     └───────────┘       │          │
//!                       │                                         ▼          │
//!     Client Response   │                                 ┌───────────────┐  │
//!     ◀─────────────────┼─────────────────────────────────│   forwarder   │◀─┼──── Backend
//!                       │                                 └───────────────┘  │
//!                       │                                                     │
//!                       │  Cross-cutting: config, observability, lifecycle    │
//!                       └────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::lifecycle::{shutdown_signal, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::{Gateway, GatewayServer};

#[derive(Parser, Debug)]
#[command(name = "api-gateway", version, about = "API gateway with token introspection")]
struct Cli {
    /// TOML configuration file. Environment variables are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate configuration, print the route table and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    // The env loader logs, so the subscriber is installed before it runs.
    let config = match &cli.config {
        Some(path) => {
            let config = load_config(path)?;
            logging::init(config.app_env, config.observability.log_level.as_deref())?;
            config
        }
        None => {
            let (app_env, log_level) = GatewayConfig::logging_from_env()?;
            logging::init(app_env, log_level.as_deref())?;
            GatewayConfig::from_env()?
        }
    };
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        app_env = %config.app_env,
        bind_address = %config.listener.bind_address,
        backends = config.backends.iter().filter(|b| b.is_enabled()).count(),
        "api-gateway starting"
    );

    let gateway = Gateway::build(config)?;

    if cli.check {
        for route in gateway.router().table().routes() {
            println!(
                "{:<7} {:<40} {} interceptors",
                route.method().to_string(),
                route.pattern().to_string(),
                route.interceptor_count()
            );
        }
        return Ok(());
    }

    if let Some(addr) = &gateway.config().observability.metrics_address {
        let addr: SocketAddr = addr.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to initialize metrics, continuing without them");
        }
    }

    let listener = TcpListener::bind(&gateway.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(gateway);
    let mut serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut serving => result??,
        _ = shutdown_signal() => {
            shutdown.trigger();
            serving.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
