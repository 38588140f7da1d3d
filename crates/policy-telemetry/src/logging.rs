//! Structured logging setup.
//!
//! Every crate logs through `tracing`; this module installs the global
//! subscriber that turns those events into lines on stdout.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Structured logger handle
pub struct LoggingGuard {
    service_name: String,
}

impl LoggingGuard {
    /// Service name the subscriber was installed for.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Install the global `tracing` subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<LoggingGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match (config.console_output, config.json_logs) {
        (false, _) => registry.try_init(),
        (true, true) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        (true, false) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            )
            .try_init(),
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging initialized"
    );

    Ok(LoggingGuard {
        service_name: config.service_name.clone(),
    })
}
