//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, introspections, upstream errors)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_introspections_total` (counter): verdicts by realm, outcome
//! - `gateway_upstream_errors_total` (counter): failures by backend, kind
//!
//! # Design Decisions
//! - Recording is a no-op until the exporter is installed
//! - Labels are bounded: route labels come from the route table, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const INTROSPECTIONS_TOTAL: &str = "gateway_introspections_total";
    pub const UPSTREAM_ERRORS_TOTAL: &str = "gateway_upstream_errors_total";
}

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(names::REQUESTS_TOTAL, "Requests served, by route, method and status");
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Request latency in seconds, by route"
    );
    describe_counter!(
        names::INTROSPECTIONS_TOTAL,
        "Token introspection verdicts, by realm and outcome"
    );
    describe_counter!(
        names::UPSTREAM_ERRORS_TOTAL,
        "Failed upstream calls, by backend and kind"
    );

    tracing::info!(addr = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    counter!(
        names::REQUESTS_TOTAL,
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// `outcome` is one of `active`, `inactive`, `error`.
pub fn record_introspection(realm: &str, outcome: &'static str) {
    counter!(
        names::INTROSPECTIONS_TOTAL,
        "realm" => realm.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// `kind` is `request` (connect or protocol failure) or `timeout`.
pub fn record_upstream_error(backend: &str, kind: &'static str) {
    counter!(
        names::UPSTREAM_ERRORS_TOTAL,
        "backend" => backend.to_string(),
        "kind" => kind
    )
    .increment(1);
}
