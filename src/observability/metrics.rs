//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ajp_connections_accepted_total` (counter)
//! - `ajp_connections_active` (gauge): current connection count
//! - `ajp_requests_total` (counter): forward requests by method
//! - `ajp_cpings_total` (counter)
//! - `ajp_broken_cycles_total` (counter): framing corruption teardowns
//! - `ajp_connection_errors_total` (counter): other fatal errors by kind
//! - `ajp_body_chunk_anomalies_total` (counter): early empty body chunks
//! - `ajp_long_running_rejected_total` (counter): duplicate submissions
//! - `ajp_sessions_rejected_total` (counter): by reason

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(active: u64) {
    counter!("ajp_connections_accepted_total").increment(1);
    gauge!("ajp_connections_active").set(active as f64);
}

pub fn record_connection_closed(active: u64) {
    gauge!("ajp_connections_active").set(active as f64);
}

pub fn record_request(method: &str) {
    counter!("ajp_requests_total", "method" => method.to_string()).increment(1);
}

pub fn record_cping() {
    counter!("ajp_cpings_total").increment(1);
}

pub fn record_broken_cycle() {
    counter!("ajp_broken_cycles_total").increment(1);
}

pub fn record_connection_error(kind: &'static str) {
    counter!("ajp_connection_errors_total", "kind" => kind).increment(1);
}

pub fn record_body_chunk_anomaly() {
    counter!("ajp_body_chunk_anomalies_total").increment(1);
}

pub fn record_long_running_rejected() {
    counter!("ajp_long_running_rejected_total").increment(1);
}

pub fn record_session_rejected(reason: &'static str) {
    counter!("ajp_sessions_rejected_total", "reason" => reason).increment(1);
}
