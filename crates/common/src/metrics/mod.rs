//! Metrics and observability utilities
//!
//! Describes the rehydration metrics with standardized naming. No exporter
//! is installed here; without a recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all ContextForge metrics
pub const METRICS_PREFIX: &str = "contextforge";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_rehydrate_total", METRICS_PREFIX),
        Unit::Count,
        "Total rehydration requests by outcome"
    );

    describe_histogram!(
        format!("{}_rehydrate_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Rehydration latency in seconds"
    );

    describe_histogram!(
        format!("{}_rehydrate_evidence_sections", METRICS_PREFIX),
        Unit::Count,
        "Evidence sections packed per bundle"
    );

    describe_counter!(
        format!("{}_degradations_total", METRICS_PREFIX),
        Unit::Count,
        "Non-fatal stage degradations"
    );

    describe_counter!(
        format!("{}_budget_exhausted_total", METRICS_PREFIX),
        Unit::Count,
        "Bundles where the token budget stopped selection early"
    );

    tracing::info!("Metrics registered");
}

/// Record a finished rehydration
pub fn record_rehydrate(duration_secs: f64, outcome: &str, evidence_count: usize) {
    counter!(
        format!("{}_rehydrate_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_rehydrate_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);

    if outcome == "ok" {
        histogram!(format!("{}_rehydrate_evidence_sections", METRICS_PREFIX))
            .record(evidence_count as f64);
    }
}

/// Record a non-fatal degradation at a pipeline stage
pub fn record_degradation(stage: &str) {
    counter!(
        format!("{}_degradations_total", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .increment(1);
}

/// Record that budgeting stopped before the candidate list was exhausted
pub fn record_budget_exhausted() {
    counter!(format!("{}_budget_exhausted_total", METRICS_PREFIX)).increment(1);
}
