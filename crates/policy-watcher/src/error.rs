//! # Watcher Errors

use crate::message::MessageError;
use policy_bus::TransportError;
use policy_types::PolicyError;
use thiserror::Error;

/// Invalid watcher configuration. No watcher is created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid transport: no channel transport configured")]
    MissingTransport,

    #[error("invalid log: no logger configured")]
    MissingLogger,

    #[error("invalid enforcer entity: no policy engine and no custom callback")]
    MissingEngine,
}

/// Errors returned by watcher operations.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to encode change message: {0}")]
    Encode(#[from] MessageError),

    /// The transport rejected an outgoing message.
    #[error("Publish failed: {0}")]
    Publish(#[source] TransportError),

    /// The listener could not subscribe during construction.
    #[error("Subscribe failed: {0}")]
    Subscribe(#[source] TransportError),

    /// The listener task ended before confirming its subscription.
    #[error("Listener exited before subscribing")]
    ListenerGone,

    /// The watcher was closed; nothing more is published.
    #[error("Watcher is closed")]
    Closed,

    /// `close` was called more than once.
    #[error("Watcher already closed")]
    AlreadyClosed,
}

impl From<WatcherError> for PolicyError {
    fn from(err: WatcherError) -> Self {
        PolicyError::Notify(err.to_string())
    }
}
