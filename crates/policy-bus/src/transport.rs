//! # Channel Transport
//!
//! The capability set the watcher needs from a broker. Connection management
//! is the implementation's business; the watcher treats a transport as
//! already connected.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Ordered stream of raw payloads from one channel.
///
/// Dropping the stream cancels the subscription.
pub type PayloadStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The broker connection is closed.
    #[error("Transport closed")]
    ChannelClosed,

    /// The broker refused the operation.
    #[error("Rejected by broker: {0}")]
    Rejected(String),

    /// Internal error.
    #[error("Internal transport error: {0}")]
    Internal(String),
}

/// Publish/subscribe by channel name.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Publish a payload on `channel`.
    ///
    /// Succeeds once the broker has accepted the payload, whether or not
    /// anyone is subscribed.
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Start receiving payloads published on `channel` from now on.
    ///
    /// The subscription is active when this returns.
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, TransportError>;
}
