//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `keto_maester_reconciliations_total` - Reconciliations by resource kind
//! - `keto_maester_reconciliation_errors_total` - Failed reconciliations by resource kind
//! - `keto_maester_reconciliation_duration_seconds` - Duration of reconciliations
//! - `keto_maester_engine_operations_total` - Keto ACP engine calls by kind and operation
//! - `keto_maester_engine_operation_errors_total` - Failed Keto ACP engine calls
//! - `keto_maester_engine_operation_duration_seconds` - Duration of Keto ACP engine calls
//! - `keto_maester_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keto_maester_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keto_maester_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "keto_maester_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static ENGINE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keto_maester_engine_operations_total",
            "Total number of Keto ACP engine operations",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create ENGINE_OPERATIONS_TOTAL metric - this should never happen")
});

static ENGINE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keto_maester_engine_operation_errors_total",
            "Total number of failed Keto ACP engine operations",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create ENGINE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static ENGINE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "keto_maester_engine_operation_duration_seconds",
            "Duration of Keto ACP engine operations in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["kind", "operation"],
    )
    .expect("Failed to create ENGINE_OPERATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "keto_maester_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register every metric, calling it again is a no-op
pub fn register_metrics() -> Result<()> {
    register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_DURATION.clone()))?;
    register(Box::new(ENGINE_OPERATIONS_TOTAL.clone()))?;
    register(Box::new(ENGINE_OPERATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(ENGINE_OPERATION_DURATION.clone()))?;
    register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

fn register(collector: Box<dyn Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

/// Record a completed Keto ACP engine call
pub fn record_engine_operation(kind: &str, operation: &str, duration: f64) {
    ENGINE_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
    ENGINE_OPERATION_DURATION
        .with_label_values(&[kind, operation])
        .observe(duration);
}

pub fn increment_engine_operation_errors(kind: &str, operation: &str) {
    ENGINE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
