//! # Policy Telemetry
//!
//! Logging and metrics shared by the policy-sync crates.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry with an env filter and a
//!   pretty or JSON formatter.
//! - **Metrics**: Prometheus counters for watcher traffic, scraped through
//!   [`encode_metrics`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use policy_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `policy-sync` | Service name attached to logs |
//! | `POLICY_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `POLICY_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `POLICY_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingGuard};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, WATCHER_APPLY_FAILURES,
    WATCHER_CALLBACK_DURATION, WATCHER_CALLBACK_PANICS, WATCHER_DECODE_FAILURES, WATCHER_MESSAGES_PUBLISHED,
    WATCHER_MESSAGES_RECEIVED, WATCHER_PUBLISH_FAILURES, WATCHER_SELF_MESSAGES_SKIPPED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register the watcher metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    let logging_guard = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
