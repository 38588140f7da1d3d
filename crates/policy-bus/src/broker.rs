//! # In-Memory Broker
//!
//! A [`ChannelTransport`] for processes sharing one address space.

use crate::subscription::Subscription;
use crate::transport::{ChannelTransport, PayloadStream, TransportError};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// In-memory implementation of the channel transport.
///
/// Uses one `tokio::sync::broadcast` channel per channel name, created on
/// first use. Suitable for single-process deployments and tests; deployments
/// spanning processes plug in a networked broker behind the same trait.
pub struct InMemoryBroker {
    /// Broadcast sender per channel name.
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,

    /// Active subscription count by channel.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total payloads accepted.
    payloads_published: AtomicU64,

    /// Set once the broker is closed.
    closed: AtomicBool,

    /// Per-channel capacity.
    capacity: usize,
}

impl InMemoryBroker {
    /// Create a new broker with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broker with the specified per-channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            payloads_published: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Subscribe to `channel`, returning the concrete subscription handle.
    #[must_use]
    pub fn subscription(&self, channel: &str) -> Subscription {
        let receiver = self.sender(channel).subscribe();

        *self
            .subscriptions
            .write()
            .entry(channel.to_string())
            .or_insert(0) += 1;

        debug!(channel = %channel, "New subscription created");

        Subscription::new(receiver, channel.to_string(), self.subscriptions.clone())
    }

    /// Number of live subscriptions on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscriptions.read().get(channel).copied().unwrap_or(0)
    }

    /// Total payloads accepted across all channels.
    #[must_use]
    pub fn payloads_published(&self) -> u64 {
        self.payloads_published.load(Ordering::Relaxed)
    }

    /// Get the per-channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the broker.
    ///
    /// Live subscriptions end after draining what they already buffered;
    /// later publish and subscribe calls fail with
    /// [`TransportError::ChannelClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.channels.write().clear();
        debug!("Broker closed");
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(sender) = self.channels.read().get(channel) {
            return sender.clone();
        }
        self.channels
            .write()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelTransport for InMemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }

        self.payloads_published.fetch_add(1, Ordering::Relaxed);

        // A send error only means nobody is listening right now.
        let receivers = self.sender(channel).send(payload).unwrap_or(0);
        debug!(channel = %channel, receivers, "Payload published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        Ok(Box::pin(self.subscription(channel)))
    }
}
