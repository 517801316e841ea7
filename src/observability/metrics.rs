//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gnmi_rpc_total` (counter): completed calls by method, status code
//! - `gnmi_rpc_duration_seconds` (histogram): call latency by method
//! - `gnmi_inflight_requests` (gauge): admitted, not yet finished calls
//! - `gnmi_admission_wait_seconds` (histogram): time spent waiting for admission
//! - `gnmi_certificate_refresh_total` (counter): secret fetches by outcome
//! - `gnmi_certificate_cache_hits_total` (counter): handshakes served from cache
//! - `gnmi_tls_handshake_total` (counter): handshakes by outcome
//! - `gnmi_active_connections` (gauge): open transport connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter is only installed when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use tonic::Code;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc(method: &'static str, code: Code, started: Instant) {
    counter!("gnmi_rpc_total", "method" => method, "code" => format!("{:?}", code)).increment(1);
    histogram!("gnmi_rpc_duration_seconds", "method" => method).record(started.elapsed().as_secs_f64());
}

pub fn record_admission_wait(started: Instant) {
    histogram!("gnmi_admission_wait_seconds").record(started.elapsed().as_secs_f64());
}

pub fn inflight_inc() {
    gauge!("gnmi_inflight_requests").increment(1.0);
}

pub fn inflight_dec() {
    gauge!("gnmi_inflight_requests").decrement(1.0);
}

/// `outcome` is `refreshed` or `failed`.
pub fn record_certificate_refresh(outcome: &'static str) {
    counter!("gnmi_certificate_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_certificate_cache_hit() {
    counter!("gnmi_certificate_cache_hits_total").increment(1);
}

pub fn record_handshake(outcome: &'static str) {
    counter!("gnmi_tls_handshake_total", "outcome" => outcome).increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("gnmi_active_connections").set(count as f64);
}
