//! # Trigger Telemetry
//!
//! Logging and metrics setup for the trigger reconciler runtime.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter` and a human or JSON layer
//! - **Metrics**: Prometheus, default registry, encoded as text for scraping
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trigger_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TR_SERVICE_NAME` | `trigger-reconciler` | Service name attached to the startup log |
//! | `TR_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `TR_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |
//! | `TR_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, HistogramTimer, JOBS_CONFIGURED, RELOADS, RELOAD_DURATION, TRIGGER_FIRES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and touch the runtime metrics so they are registered
/// before the first scrape.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    metrics::register_metrics();
    init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard held for the lifetime of the application.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Log a job-scoped event with the standard `job` field.
///
/// ```rust,ignore
/// log_job_event!(info, "nightly", "Trigger fired", kind = "timer");
/// ```
#[macro_export]
macro_rules! log_job_event {
    ($level:ident, $job:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            job = %$job,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TelemetryError::LoggingInit("already set".into());
        assert_eq!(err.to_string(), "Failed to initialize logging: already set");
    }

    #[test]
    fn test_log_job_event_expands() {
        log_job_event!(info, "nightly", "Trigger fired", kind = "timer");
        log_job_event!(debug, "nightly", "No fields");
    }
}
