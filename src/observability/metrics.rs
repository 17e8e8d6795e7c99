//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_dispatch_total` (counter): dispatches by method, outcome
//! - `relay_dispatch_duration_seconds` (histogram): submit latency
//! - `relay_pool_wallets` (gauge): pool wallets by state
//! - `relay_pool_forced_releases_total` (counter): deadline-expired leases
//! - `relay_fee_quote_fallback_total` (counter): static fee fallbacks
//! - `relay_confirmations_total` (counter): watcher outcomes by status
//! - `relay_rpc_health` (gauge): 1=healthy, 0=unhealthy

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(method: &str, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "relay_dispatch_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("relay_dispatch_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_pool_stats(total: usize, available: usize, in_use: usize) {
    metrics::gauge!("relay_pool_wallets", "state" => "total").set(total as f64);
    metrics::gauge!("relay_pool_wallets", "state" => "available").set(available as f64);
    metrics::gauge!("relay_pool_wallets", "state" => "in_use").set(in_use as f64);
}

pub fn record_forced_release() {
    metrics::counter!("relay_pool_forced_releases_total").increment(1);
}

pub fn record_fee_fallback(reason: &'static str) {
    metrics::counter!("relay_fee_quote_fallback_total", "reason" => reason).increment(1);
}

pub fn record_confirmation(status: &'static str) {
    metrics::counter!("relay_confirmations_total", "status" => status).increment(1);
}

pub fn record_rpc_health(healthy: bool) {
    metrics::gauge!("relay_rpc_health").set(if healthy { 1.0 } else { 0.0 });
}
