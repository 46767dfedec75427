//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, rollout group
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_buffer_spills_total` (counter): spill files created
//! - `proxy_buffer_oversized_total` (counter): bodies rejected by the size ceiling
//! - `proxy_rollout_decisions_total` (counter): routing decisions by group
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed proxied request.
pub fn record_request(method: &str, status: u16, group: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "group" => group
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "group" => group)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_spill() {
    counter!("proxy_buffer_spills_total").increment(1);
}

/// `direction` is "request" or "response".
pub fn record_oversized(direction: &'static str) {
    counter!("proxy_buffer_oversized_total", "direction" => direction).increment(1);
}

pub fn record_rollout_decision(group: &'static str) {
    counter!("proxy_rollout_decisions_total", "group" => group).increment(1);
}
