// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // 1. Initialize Tracing (Logs)
    let registered = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcd_agent=info,mcd_cli=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if registered.is_err() {
        tracing::debug!("Global subscriber already installed");
    }

    // 2. Initialize Metrics (Prometheus)
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::warn!("Failed to install Prometheus recorder: {}", e),
    }

    metrics::describe_counter!("mcd_transactions_total", "Update transactions started");
    metrics::describe_counter!("mcd_transaction_failures_total", "Update transactions that ended in an error, by kind");
    metrics::describe_counter!("mcd_rollbacks_total", "Update transactions that unwound their rollback ledger");
    metrics::describe_histogram!("mcd_transaction_duration_seconds", "Wall time of one update transaction");
}

/// Render the Prometheus exposition text
pub fn render_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
