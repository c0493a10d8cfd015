//! Metrics module for membership-service.
//! Provides Prometheus metrics for invoice, quota and reward operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "membership_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Invoice operations counter
pub static INVOICE_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Quota consumed counter
pub static QUOTA_CONSUMED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Rewards issued counter
pub static REWARDS_ISSUED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    INVOICE_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "membership_invoice_operations_total",
                "Invoice creations and transitions by resulting status"
            ),
            &["operation", "status"]
        )
        .expect("Failed to register INVOICE_OPERATIONS_TOTAL")
    });

    QUOTA_CONSUMED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "membership_quota_consumed_total",
                "Quota units consumed from subscription grants"
            ),
            &["outcome"]
        )
        .expect("Failed to register QUOTA_CONSUMED_TOTAL")
    });

    REWARDS_ISSUED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "membership_rewards_issued_total",
                "Spending-threshold rewards issued by kind"
            ),
            &["kind"]
        )
        .expect("Failed to register REWARDS_ISSUED_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("membership_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an invoice creation or transition.
pub fn record_invoice_operation(operation: &str, status: &str) {
    if let Some(counter) = INVOICE_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, status]).inc();
    }
}

/// Record quota consumption.
pub fn record_quota_consumed(outcome: &str, units: u64) {
    if let Some(counter) = QUOTA_CONSUMED_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc_by(units);
    }
}

/// Record issued rewards.
pub fn record_rewards_issued(kind: &str, count: usize) {
    if let Some(counter) = REWARDS_ISSUED_TOTAL.get() {
        counter.with_label_values(&[kind]).inc_by(count as u64);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
