//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_breaker_state` (gauge): 0=closed, 1=open, 2=half-open, by resource
//! - `guard_breaker_transitions_total` (counter): by resource, from, to
//! - `guard_calls_total` (counter): by resource, outcome
//! - `guard_call_duration_seconds` (histogram): attempt latency by resource
//! - `guard_retries_total` (counter): by resource
//! - `guard_requests_total` / `guard_request_duration_seconds`: HTTP surface
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until an exporter is installed, so
//!   library users and tests pay nothing
//! - Prometheus exporter listens on its own address

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::resilience::CircuitState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_state(resource: &str, state: CircuitState) {
    metrics::gauge!("guard_breaker_state", "resource" => resource.to_string()).set(state.as_gauge());
}

pub fn record_breaker_transition(resource: &str, from: CircuitState, to: CircuitState) {
    metrics::counter!(
        "guard_breaker_transitions_total",
        "resource" => resource.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(resource, to);
}

/// `outcome` is one of success, failure, timeout, rejected.
pub fn record_call(resource: &str, outcome: &'static str, took: Option<Duration>) {
    metrics::counter!(
        "guard_calls_total",
        "resource" => resource.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    if let Some(took) = took {
        metrics::histogram!("guard_call_duration_seconds", "resource" => resource.to_string())
            .record(took.as_secs_f64());
    }
}

pub fn record_retry(resource: &str) {
    metrics::counter!("guard_retries_total", "resource" => resource.to_string()).increment(1);
}

pub fn record_request(method: &str, status: u16, resource: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("resource", resource.to_string()),
    ];
    metrics::counter!("guard_requests_total", &labels).increment(1);
    metrics::histogram!("guard_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}
