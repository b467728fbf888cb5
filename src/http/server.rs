//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum app with the gateway router as its only handler
//! - Wire up tower-http layers (request ID, tracing, overall timeout)
//! - Bind to a listener with connect info and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::State, http::Request, response::Response, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::gateway::Gateway;
use crate::lifecycle::shutdown;
use crate::routing::Router as GatewayRouter;

/// HTTP server for the gateway.
pub struct GatewayServer {
    app: Router,
    gateway: Gateway,
}

impl GatewayServer {
    pub fn new(gateway: Gateway) -> Self {
        let app = build_app(
            gateway.router(),
            Duration::from_secs(gateway.config().timeouts.request_secs),
        );
        Self { app, gateway }
    }

    /// The axum app, for in-process use.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the axum app around a composed router.
#[allow(deprecated)]
pub fn build_app(router: Arc<GatewayRouter>, request_timeout: Duration) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(router)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn dispatch(State(router): State<Arc<GatewayRouter>>, request: Request<Body>) -> Response {
    router.dispatch(request).await
}
