//! # Subscription
//!
//! The receiving side of the in-memory broker.

use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// A live subscription to one channel of an [`InMemoryBroker`](crate::InMemoryBroker).
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    /// Payloads of the subscribed channel.
    inner: BroadcastStream<String>,

    /// Channel this subscription listens on.
    channel: String,

    /// Reference to subscription tracking (for cleanup).
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<String>,
        channel: String,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    ) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            channel,
            subscriptions,
        }
    }

    /// Receive the next payload.
    ///
    /// # Returns
    ///
    /// - `Some(payload)` - The next payload on the channel
    /// - `None` - The broker was closed or dropped
    pub async fn recv(&mut self) -> Option<String> {
        self.next().await
    }

    /// Channel this subscription listens on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(payload)) => return Poll::Ready(Some(payload)),
                Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                    debug!(
                        channel = %self.channel,
                        lagged = count,
                        "Subscriber lagged, some payloads dropped"
                    );
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = self.subscriptions.write();
        if let Some(count) = subs.get_mut(&self.channel) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.channel);
            }
        }
        debug!(channel = %self.channel, "Subscription dropped");
    }
}
