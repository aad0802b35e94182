//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Executed and rejected exchange operations
//! - Reserve levels per asset
//! - Health checks

use crate::error::ExchangeResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Operation metrics
    pub static ref OPS_EXECUTED: CounterVec = register_counter_vec!(
        "wrapper_operations_executed_total",
        "Total exchange operations executed",
        &["direction"]
    ).unwrap();

    pub static ref OPS_REJECTED: CounterVec = register_counter_vec!(
        "wrapper_operations_rejected_total",
        "Total exchange operations rejected by reason",
        &["direction", "reason"]
    ).unwrap();

    pub static ref OP_AMOUNT: HistogramVec = register_histogram_vec!(
        "wrapper_operation_amount",
        "Amount moved per executed operation",
        &["direction"],
        vec![1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0]
    ).unwrap();

    // Reserve metrics
    pub static ref RESERVE: GaugeVec = register_gauge_vec!(
        "wrapper_reserve_units",
        "Exchange account balance per asset",
        &["asset"]
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "wrapper_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "wrapper_health_check_failure_total",
        "Total failed health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> ExchangeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::ExchangeError::Internal(e.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::ExchangeError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_op_executed(direction: &str, amount: u128) {
    OPS_EXECUTED.with_label_values(&[direction]).inc();
    OP_AMOUNT
        .with_label_values(&[direction])
        .observe(amount as f64);
}

pub fn record_op_rejected(direction: &str, reason: &str) {
    OPS_REJECTED.with_label_values(&[direction, reason]).inc();
}

pub fn record_reserve(asset: &str, balance: u128) {
    RESERVE.with_label_values(&[asset]).set(balance as f64);
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
