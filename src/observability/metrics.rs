//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_listeners_started_total` (counter)
//! - `router_listener_bind_failures_total` (counter)
//! - `router_listeners_stopped_total` (counter)
//! - `router_listener_close_failures_total` (counter)
//! - `router_active_listeners` (gauge)
//! - `router_reconciliations_total` (counter): by kind, outcome
//! - `router_reconcile_duration_seconds` (histogram)
//! - `router_requests_total` (counter): by method

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn listener_started() {
    counter!("router_listeners_started_total").increment(1);
    gauge!("router_active_listeners").increment(1.0);
}

pub fn listener_bind_failed() {
    counter!("router_listener_bind_failures_total").increment(1);
}

/// The listener no longer counts as active, whatever the close outcome.
pub fn listener_released() {
    gauge!("router_active_listeners").decrement(1.0);
}

pub fn listener_stopped() {
    counter!("router_listeners_stopped_total").increment(1);
}

pub fn listener_close_failed() {
    counter!("router_listener_close_failures_total").increment(1);
}

pub fn record_reconciliation(kind: &'static str, outcome: &'static str, start: Instant) {
    counter!("router_reconciliations_total", "kind" => kind, "outcome" => outcome).increment(1);
    histogram!("router_reconcile_duration_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
}

pub fn record_request(method: &str) {
    counter!("router_requests_total", "method" => method.to_string()).increment(1);
}
