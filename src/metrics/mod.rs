//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Account lookups
//! - Transaction submissions per broadcast mode
//! - Broadcast rejections by code and transport failures
//! - Submission latency
//!
//! A one-shot process has nothing to scrape, so the exposition is written to
//! a textfile for the node exporter's textfile collector.

use crate::error::{SubmitError, SubmitResult};

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::path::Path;
use tracing::info;

lazy_static! {
    pub static ref ACCOUNT_LOOKUPS: Counter = register_counter!(
        "secret_submitter_account_lookups_total",
        "Total account identity lookups"
    ).unwrap();

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "secret_submitter_transactions_submitted_total",
        "Total transactions handed to the broadcast endpoint",
        &["mode"]
    ).unwrap();

    pub static ref TX_ACCEPTED: CounterVec = register_counter_vec!(
        "secret_submitter_transactions_accepted_total",
        "Total transactions acknowledged with result code 0",
        &["mode"]
    ).unwrap();

    pub static ref TX_REJECTED: CounterVec = register_counter_vec!(
        "secret_submitter_transactions_rejected_total",
        "Total broadcast rejections by result code",
        &["codespace", "code"]
    ).unwrap();

    pub static ref PIPELINE_ERRORS: CounterVec = register_counter_vec!(
        "secret_submitter_pipeline_errors_total",
        "Total pipeline failures by error kind",
        &["kind"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "secret_submitter_submission_latency_seconds",
        "Latency from identity lookup to broadcast acknowledgement",
        &["mode"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Write the current exposition to `path`
pub fn write_textfile(path: &Path) -> SubmitResult<()> {
    std::fs::write(path, render())
        .map_err(|e| SubmitError::Config(format!("Failed to write metrics to {:?}: {}", path, e)))?;
    info!("Metrics written to {:?}", path);
    Ok(())
}

// Helper functions to record metrics

pub fn record_account_lookup() {
    ACCOUNT_LOOKUPS.inc();
}

pub fn record_tx_submitted(mode: &str) {
    TX_SUBMITTED.with_label_values(&[mode]).inc();
}

pub fn record_tx_accepted(mode: &str) {
    TX_ACCEPTED.with_label_values(&[mode]).inc();
}

pub fn record_tx_latency(mode: &str, latency_secs: f64) {
    TX_LATENCY.with_label_values(&[mode]).observe(latency_secs);
}

pub fn record_error(error: &SubmitError) {
    if let SubmitError::BroadcastFailure {
        code, codespace, ..
    } = error
    {
        TX_REJECTED
            .with_label_values(&[codespace.as_str(), &code.to_string()])
            .inc();
    }
    PIPELINE_ERRORS.with_label_values(&[error.kind()]).inc();
}
