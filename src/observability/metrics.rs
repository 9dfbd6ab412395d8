//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus exporter and its scrape listener
//! - Give every subsystem a small typed function per metric
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by method, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency
//! - `gateway_rate_limited_total` (counter): throttle rejections by reason
//! - `gateway_downstream_requests_total` (counter): attempts by service, outcome
//! - `gateway_downstream_duration_seconds` (histogram): attempt latency by service
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `gateway_retries_total` (counter): scheduled retries by service
//!
//! # Design Decisions
//! - Call sites never touch the `metrics` macros directly
//! - Without an installed recorder every function is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One inbound request answered by the gateway.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

/// One request rejected by the admission throttle.
pub fn record_rate_limited(reason: &'static str) {
    counter!("gateway_rate_limited_total", "reason" => reason).increment(1);
}

/// Current breaker state of a service.
pub fn record_breaker_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("gateway_circuit_state", "service" => service.to_string()).set(value);
}

/// One downstream attempt. `start` is absent when the call never left the gateway.
pub fn record_downstream(service: &str, outcome: &'static str, start: Option<Instant>) {
    counter!(
        "gateway_downstream_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    if let Some(start) = start {
        histogram!("gateway_downstream_duration_seconds", "service" => service.to_string())
            .record(start.elapsed().as_secs_f64());
    }
}

/// One retry scheduled by a service's retry policy.
pub fn record_retry(service: &str) {
    counter!("gateway_retries_total", "service" => service.to_string()).increment(1);
}
