//! Prometheus metrics for the policy watcher.
//!
//! All metrics follow the naming convention: `policy_watcher_<metric>_<unit>`
//! and carry a `channel` label so instances watching different channels can
//! be told apart.

use lazy_static::lazy_static;
use prometheus::{exponential_buckets, CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Change messages accepted by the transport
    pub static ref WATCHER_MESSAGES_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_messages_published_total", "Change messages published"),
        &["channel", "method"]
    ).expect("metric creation failed");

    /// Change messages the transport rejected
    pub static ref WATCHER_PUBLISH_FAILURES: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_publish_failures_total", "Change messages the transport rejected"),
        &["channel"]
    ).expect("metric creation failed");

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Payloads handed to the update callback
    pub static ref WATCHER_MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_messages_received_total", "Change messages delivered to the callback"),
        &["channel", "method"]
    ).expect("metric creation failed");

    /// Payloads dropped because this instance published them
    pub static ref WATCHER_SELF_MESSAGES_SKIPPED: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_self_messages_skipped_total", "Self-originated messages dropped"),
        &["channel"]
    ).expect("metric creation failed");

    /// Payloads that could not be decoded
    pub static ref WATCHER_DECODE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_decode_failures_total", "Payloads that failed to decode"),
        &["channel"]
    ).expect("metric creation failed");

    /// Changes the local policy engine failed or declined to apply
    pub static ref WATCHER_APPLY_FAILURES: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_apply_failures_total", "Changes not applied to the local engine"),
        &["method"]
    ).expect("metric creation failed");

    /// Update callbacks that panicked
    pub static ref WATCHER_CALLBACK_PANICS: CounterVec = CounterVec::new(
        Opts::new("policy_watcher_callback_panics_total", "Update callbacks that panicked"),
        &["channel"]
    ).expect("metric creation failed");

    /// Time spent inside the update callback
    pub static ref WATCHER_CALLBACK_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "policy_watcher_callback_duration_seconds",
            "Time spent in the update callback per message"
        ).buckets(exponential_buckets(0.00001, 2.0, 15).expect("valid buckets")),
        &["channel"]
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Outbound
        Box::new(WATCHER_MESSAGES_PUBLISHED.clone()),
        Box::new(WATCHER_PUBLISH_FAILURES.clone()),
        // Inbound
        Box::new(WATCHER_MESSAGES_RECEIVED.clone()),
        Box::new(WATCHER_SELF_MESSAGES_SKIPPED.clone()),
        Box::new(WATCHER_DECODE_FAILURES.clone()),
        Box::new(WATCHER_APPLY_FAILURES.clone()),
        Box::new(WATCHER_CALLBACK_PANICS.clone()),
        Box::new(WATCHER_CALLBACK_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
