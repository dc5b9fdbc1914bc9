//! Prometheus metrics for the runtime.
//!
//! All metrics live in the default registry, next to the reconciler's own
//! `trigger_*` metrics, so one scrape of [`encode_metrics`] returns both.
//!
//! ## Metric Types
//!
//! - **Counter**: reloads, fires
//! - **Gauge**: jobs currently declared
//! - **Histogram**: reload duration

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, register_histogram, register_int_counter_vec, register_int_gauge, Encoder,
    Histogram, IntCounterVec, IntGauge, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Jobs declared in the last successfully read definitions file
    pub static ref JOBS_CONFIGURED: IntGauge = register_int_gauge!(
        "trigger_runtime_jobs_configured",
        "Number of jobs declared in the job definitions file"
    ).expect("metric creation failed");

    /// Definition reloads by outcome (ok / invalid / conflict)
    pub static ref RELOADS: IntCounterVec = register_int_counter_vec!(
        "trigger_runtime_reloads_total",
        "Total job definition reloads",
        &["outcome"]
    ).expect("metric creation failed");

    /// Time spent reconciling every job after a reload
    pub static ref RELOAD_DURATION: Histogram = register_histogram!(
        "trigger_runtime_reload_duration_seconds",
        "Time spent reconciling all jobs after a reload",
        exponential_buckets(0.001, 2.0, 15).expect("valid buckets")
    ).expect("metric creation failed");

    /// Trigger fires observed on the event bus, by kind
    pub static ref TRIGGER_FIRES: IntCounterVec = register_int_counter_vec!(
        "trigger_runtime_fires_total",
        "Total trigger fires observed",
        &["kind"]
    ).expect("metric creation failed");
}

/// Force registration of the runtime metrics.
pub fn register_metrics() {
    lazy_static::initialize(&JOBS_CONFIGURED);
    lazy_static::initialize(&RELOADS);
    lazy_static::initialize(&RELOAD_DURATION);
    lazy_static::initialize(&TRIGGER_FIRES);
}

/// Encode the default registry as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_repeatable() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_counter_increment() {
        TRIGGER_FIRES.with_label_values(&["timer"]).inc();
        assert!(TRIGGER_FIRES.with_label_values(&["timer"]).get() >= 1);
    }

    #[test]
    fn test_encode_contains_runtime_metrics() {
        register_metrics();
        JOBS_CONFIGURED.set(3);
        RELOADS.with_label_values(&["ok"]).inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("trigger_runtime_jobs_configured"));
        assert!(text.contains("trigger_runtime_reloads_total"));
    }

    #[test]
    fn test_histogram_timer_observes_on_drop() {
        let before = RELOAD_DURATION.get_sample_count();
        {
            let _timer = time_histogram!(RELOAD_DURATION);
        }
        assert!(RELOAD_DURATION.get_sample_count() > before);
    }
}
