//! # Reconciler Metrics
//!
//! Prometheus metrics for monitoring reconciliation.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! trigger-reconciler = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `trigger_reconciliations_total` - Counter of passes (by outcome)
//! - `trigger_starts_total` - Counter of triggers activated
//! - `trigger_stops_total` - Counter of triggers deactivated
//! - `trigger_activation_failures_total` - Counter of failed activations (by kind)
//! - `trigger_deactivation_failures_total` - Counter of failed deactivations (by kind);
//!   each one may be leaked background work
//! - `trigger_containers_removed_total` - Counter of containers torn down
//! - `trigger_reconcile_duration_seconds` - Histogram of pass duration

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Reconciliation passes, labeled by outcome
    pub static ref RECONCILIATIONS: IntCounterVec = register_int_counter_vec!(
        "trigger_reconciliations_total",
        "Total number of reconciliation passes",
        &["outcome"]
    )
    .expect("Failed to create RECONCILIATIONS metric");

    /// Triggers activated
    pub static ref STARTS: IntCounter = register_int_counter!(
        "trigger_starts_total",
        "Total number of triggers activated"
    )
    .expect("Failed to create STARTS metric");

    /// Triggers deactivated
    pub static ref STOPS: IntCounter = register_int_counter!(
        "trigger_stops_total",
        "Total number of triggers deactivated"
    )
    .expect("Failed to create STOPS metric");

    /// Failed activations, labeled by kind
    pub static ref ACTIVATION_FAILURES: IntCounterVec = register_int_counter_vec!(
        "trigger_activation_failures_total",
        "Total number of failed trigger activations",
        &["kind"]
    )
    .expect("Failed to create ACTIVATION_FAILURES metric");

    /// Failed deactivations, labeled by kind
    pub static ref DEACTIVATION_FAILURES: IntCounterVec = register_int_counter_vec!(
        "trigger_deactivation_failures_total",
        "Total number of failed trigger deactivations (possible leaked work)",
        &["kind"]
    )
    .expect("Failed to create DEACTIVATION_FAILURES metric");

    /// Containers removed because no triggers remained
    pub static ref CONTAINERS_REMOVED: IntCounter = register_int_counter!(
        "trigger_containers_removed_total",
        "Total number of trigger containers removed"
    )
    .expect("Failed to create CONTAINERS_REMOVED metric");

    /// Pass duration
    pub static ref RECONCILE_DURATION: Histogram = register_histogram!(
        "trigger_reconcile_duration_seconds",
        "Duration of reconciliation passes in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create RECONCILE_DURATION metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a finished pass with its outcome label and duration
#[cfg(feature = "metrics")]
pub fn record_reconciliation(outcome: &str, seconds: f64) {
    RECONCILIATIONS.with_label_values(&[outcome]).inc();
    RECONCILE_DURATION.observe(seconds);
}

/// Record a trigger activated
#[cfg(feature = "metrics")]
pub fn record_start() {
    STARTS.inc();
}

/// Record a trigger deactivated
#[cfg(feature = "metrics")]
pub fn record_stop() {
    STOPS.inc();
}

/// Record a failed activation
#[cfg(feature = "metrics")]
pub fn record_activation_failure(kind: &str) {
    ACTIVATION_FAILURES.with_label_values(&[kind]).inc();
}

/// Record a failed deactivation
#[cfg(feature = "metrics")]
pub fn record_deactivation_failure(kind: &str) {
    DEACTIVATION_FAILURES.with_label_values(&[kind]).inc();
}

/// Record a container removal
#[cfg(feature = "metrics")]
pub fn record_container_removed() {
    CONTAINERS_REMOVED.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature is disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_reconciliation(_outcome: &str, _seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_start() {}

#[cfg(not(feature = "metrics"))]
pub fn record_stop() {}

#[cfg(not(feature = "metrics"))]
pub fn record_activation_failure(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_deactivation_failure(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_container_removed() {}
