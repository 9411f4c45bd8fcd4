//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_tokens_in_flight` (gauge): admission tokens held
//! - `router_token_wait_seconds` (histogram): time blocked in acquire
//! - `router_backend_up` (gauge): 1=up, 0=down, -1=manual down
//! - `router_pool_members` (gauge): members per workload class
//! - `router_connections_total` (counter): routed connections by kind
//! - `router_route_errors_total` (counter): failed routing by reason
//! - `router_scale_requests_total` (counter): scale requests by outcome
//! - `router_client_qps` (gauge): last flushed client QPS
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Sub-microsecond token waits are not recorded

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::backend::{Liveness, WorkloadClass};

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_token_acquired(wait: Duration) {
    metrics::gauge!("router_tokens_in_flight").increment(1.0);
    if wait >= Duration::from_micros(1) {
        metrics::histogram!("router_token_wait_seconds").record(wait.as_secs_f64());
    }
}

pub fn record_token_released() {
    metrics::gauge!("router_tokens_in_flight").decrement(1.0);
}

pub fn record_backend_liveness(class: WorkloadClass, backend: &str, state: Liveness) {
    let value = match state {
        Liveness::Up => 1.0,
        Liveness::Down => 0.0,
        Liveness::ManualDown => -1.0,
    };
    metrics::gauge!(
        "router_backend_up",
        "class" => class.as_str(),
        "backend" => backend.to_string()
    )
    .set(value);
}

pub fn record_pool_members(class: WorkloadClass, members: usize) {
    metrics::gauge!("router_pool_members", "class" => class.as_str()).set(members as f64);
}

pub fn record_connection(class: WorkloadClass, kind: &'static str) {
    metrics::counter!("router_connections_total", "class" => class.as_str(), "kind" => kind).increment(1);
}

pub fn record_route_error(class: WorkloadClass, reason: &'static str) {
    metrics::counter!("router_route_errors_total", "class" => class.as_str(), "reason" => reason)
        .increment(1);
}

pub fn record_scale_request(class: WorkloadClass, direction: &'static str, outcome: &'static str) {
    metrics::counter!(
        "router_scale_requests_total",
        "class" => class.as_str(),
        "direction" => direction,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_client_qps(qps: f64) {
    metrics::gauge!("router_client_qps").set(qps);
}
