//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): dispatched requests by route, status
//! - `gateway_request_duration_seconds` (histogram): dispatch latency by route
//! - `gateway_dispatch_outcomes_total` (counter): completed/failed/cancelled
//! - `gateway_sync_passes_total` (counter): synchronization passes by result
//! - `gateway_routes` (gauge): routes currently published
//!
//! # Design Decisions
//! - Labels are route ids, never raw paths (bounded cardinality)
//! - Unmatched requests are labelled with the not-found route id

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a dispatched request.
pub fn record_request(route_id: &str, status: u16, start: Instant) {
    let duration = start.elapsed().as_secs_f64();

    ::metrics::counter!(
        "gateway_requests_total",
        "route" => route_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "route" => route_id.to_string()
    )
    .record(duration);
}

/// Record how a filter chain ended.
pub fn record_dispatch_outcome(outcome: &'static str) {
    ::metrics::counter!("gateway_dispatch_outcomes_total", "outcome" => outcome).increment(1);
}

/// Record one synchronization pass (`applied` or `feed_error`).
pub fn record_sync_pass(result: &'static str) {
    ::metrics::counter!("gateway_sync_passes_total", "result" => result).increment(1);
}

/// Set the published route gauge.
pub fn record_route_count(count: usize) {
    ::metrics::gauge!("gateway_routes").set(count as f64);
}
