//! # Watcher Logging
//!
//! The watcher never writes to a global logger with mutable state. It is
//! handed a [`WatcherLog`] and passes it pre-formatted arguments, so
//! concurrent calls from the listener and from publishers cannot interfere.

use std::fmt;

/// Leveled logging capability injected into a watcher.
pub trait WatcherLog: Send + Sync {
    /// Informational event, e.g. a received message.
    fn info(&self, args: fmt::Arguments<'_>);

    /// A failure the watcher recovered from or reports to its caller.
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Forwards to `tracing` under the `policy_watcher` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl WatcherLog for TracingLog {
    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "policy_watcher", "{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(target: "policy_watcher", "{}", args);
    }
}
