//! Metrics collection and exposition.
//!
//! # Metrics
//! - `server_requests_total` (counter): total requests by method, status
//! - `server_request_duration_seconds` (histogram): latency distribution
//! - `server_active_connections` (gauge): current connection count
//! - `server_forced_closes_total` (counter): responses stamped with `Connection: close`
//! - `server_header_conflicts_total` (counter): rejected overrides of a forced close
//! - `server_rewrite_matches_total` (counter): rewrite rule matches by rule name
//!
//! All recording functions are no-ops until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("server_requests_total", &labels).increment(1);
    histogram!("server_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    gauge!("server_active_connections").set(count as f64);
}

pub fn record_forced_close() {
    counter!("server_forced_closes_total").increment(1);
}

pub fn record_header_conflict() {
    counter!("server_header_conflicts_total").increment(1);
}

pub fn record_rewrite_match(rule: &str) {
    counter!("server_rewrite_matches_total", "rule" => rule.to_string()).increment(1);
}
