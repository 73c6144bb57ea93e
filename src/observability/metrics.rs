//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bgremoval_requests_total` (counter): finished requests by path, status
//! - `bgremoval_request_duration_seconds` (histogram): request latency
//! - `bgremoval_rate_limited_total` (counter): rejected admissions

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener. Failure to install
/// is logged, not fatal: the service runs without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "Failed to install metrics exporter"),
    }
}

/// Record one finished request.
pub fn record_request(path: &'static str, status: u16, started: Instant) {
    counter!(
        "bgremoval_requests_total",
        "path" => path,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bgremoval_request_duration_seconds", "path" => path)
        .record(started.elapsed().as_secs_f64());
}

/// Record a rejected admission.
pub fn record_rate_limited() {
    counter!("bgremoval_rate_limited_total").increment(1);
}
