//! # Watcher
//!
//! Publishes local policy changes on a shared channel and feeds changes
//! published by other instances to the installed callback.
//!
//! ## Lifecycle
//!
//! ```text
//! new() ──┬── no_subscribe ──→ Unsubscribed ──┐
//!         │                                   ├── close() ──→ Closed
//!         └── listener ready ─→ Subscribed ───┘
//! ```
//!
//! The listener task owns the only subscription. It exits when the
//! cancellation watch fires, when the stream ends, or when it reads the
//! `"close"` sentinel.
//!
//! ## Locking
//!
//! One `tokio::sync::Mutex` guards the callback, the closed flag and the
//! listener handle. Publishes hold it across the transport call, so
//! concurrent publishes and the close sentinel never interleave.
//!
//! The listener only holds it long enough to clone the callback and runs
//! the callback with the mutex released. A publish, a callback swap or a
//! `close()` may therefore overlap a running callback; callbacks are still
//! never concurrent with each other. A callback may publish through, or
//! close, its own watcher. A panicking callback costs one error log line
//! and the listener moves on to the next message.

use crate::dispatcher::UpdateCallback;
use crate::error::WatcherError;
use crate::log::WatcherLog;
use crate::message::{ChangeMessage, Envelope, PolicyChange, UpdateType, CLOSE_SENTINEL};
use crate::options::WatcherOptions;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use policy_bus::{ChannelTransport, PayloadStream, TransportError};
use policy_telemetry::{
    WATCHER_CALLBACK_DURATION, WATCHER_CALLBACK_PANICS, WATCHER_DECODE_FAILURES,
    WATCHER_MESSAGES_PUBLISHED, WATCHER_MESSAGES_RECEIVED, WATCHER_PUBLISH_FAILURES,
    WATCHER_SELF_MESSAGES_SKIPPED,
};
use policy_types::{PolicyError, PolicyNotifier, Rule};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps one process's policy engine in step with every other process on
/// the same channel.
pub struct Watcher {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn ChannelTransport>,
    log: Arc<dyn WatcherLog>,
    channel: String,
    local_id: String,
    ignore_self: bool,
    state: Mutex<State>,
    shutdown_tx: watch::Sender<bool>,
}

struct State {
    callback: UpdateCallback,
    closed: bool,
    listener: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Build a watcher and, unless `no_subscribe` is set, start its listener.
    ///
    /// Returns once the listener's subscription is active, so a change
    /// published right after this call is never missed.
    pub async fn new(options: WatcherOptions) -> Result<Self, WatcherError> {
        let resolved = options.resolve()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            transport: resolved.transport,
            log: resolved.log,
            channel: resolved.channel,
            local_id: resolved.local_id,
            ignore_self: resolved.ignore_self,
            state: Mutex::new(State {
                callback: resolved.callback,
                closed: false,
                listener: None,
            }),
            shutdown_tx,
        });

        if !resolved.no_subscribe {
            let handle = spawn_listener(Arc::clone(&inner), shutdown_rx).await?;
            inner.state.lock().await.listener = Some(handle);
        }

        info!(
            channel = %inner.channel,
            local_id = %inner.local_id,
            subscribed = !resolved.no_subscribe,
            "Policy watcher started"
        );

        Ok(Self { inner })
    }

    /// Channel this watcher publishes and listens on.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Identifier stamped on every outgoing message.
    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    /// Whether the listener task is still running.
    pub async fn is_subscribed(&self) -> bool {
        let state = self.inner.state.lock().await;
        state
            .listener
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }

    /// Replace the callback. Deliveries already in progress keep the old one.
    pub async fn set_update_callback(&self, callback: UpdateCallback) {
        self.inner.state.lock().await.callback = callback;
    }

    /// Ask every instance to reload its whole policy.
    pub async fn update(&self) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::Update).await
    }

    pub async fn update_for_add_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::AddPolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rule,
        })
        .await
    }

    pub async fn update_for_remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::RemovePolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rule,
        })
        .await
    }

    pub async fn update_for_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::RemoveFilteredPolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            field_index,
            field_values,
        })
        .await
    }

    pub async fn update_for_save_policy(&self) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::SavePolicy).await
    }

    pub async fn update_for_add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::AddPolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rules,
        })
        .await
    }

    pub async fn update_for_remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::RemovePolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rules,
        })
        .await
    }

    pub async fn update_for_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::UpdatePolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            old_rule,
            new_rule,
        })
        .await
    }

    pub async fn update_for_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<(), WatcherError> {
        self.publish_change(PolicyChange::UpdatePolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            old_rules,
            new_rules,
        })
        .await
    }

    /// Stamp, encode and publish one change under the lifecycle mutex.
    pub async fn publish_change(&self, change: PolicyChange) -> Result<(), WatcherError> {
        let method = change.update_type();
        let payload = ChangeMessage::new(self.inner.local_id.as_str(), change)
            .encode()
            .map_err(|err| {
                self.inner.log.error(format_args!("[{method}] err: {err}"));
                WatcherError::Encode(err)
            })?;

        let state = self.inner.state.lock().await;
        if state.closed {
            return Err(WatcherError::Closed);
        }

        match self.inner.transport.publish(&self.inner.channel, payload).await {
            Ok(()) => {
                WATCHER_MESSAGES_PUBLISHED
                    .with_label_values(&[&self.inner.channel, method.as_str()])
                    .inc();
                Ok(())
            }
            Err(err) => {
                self.inner.log.error(format_args!("[{method}] err: {err}"));
                WATCHER_PUBLISH_FAILURES
                    .with_label_values(&[&self.inner.channel])
                    .inc();
                Err(WatcherError::Publish(err))
            }
        }
    }

    /// Stop the listener and publish the close sentinel.
    ///
    /// Waits for the listener task to finish. A second call returns
    /// [`WatcherError::AlreadyClosed`].
    pub async fn close(&self) -> Result<(), WatcherError> {
        let listener = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(WatcherError::AlreadyClosed);
            }
            state.closed = true;
            self.inner.shutdown_tx.send_replace(true);

            if let Err(err) = self
                .inner
                .transport
                .publish(&self.inner.channel, CLOSE_SENTINEL.to_string())
                .await
            {
                self.inner
                    .log
                    .error(format_args!("failed to publish close sentinel: {err}"));
            }
            state.listener.take()
        };

        if let Some(handle) = listener {
            if tokio::task::try_id() == Some(handle.id()) {
                // Called from a callback: the listener exits once it returns.
                debug!(channel = %self.inner.channel, "Close requested by the listener itself");
            } else if let Err(err) = handle.await {
                warn!(channel = %self.inner.channel, error = %err, "Listener task failed");
            }
        }

        info!(channel = %self.inner.channel, local_id = %self.inner.local_id, "Policy watcher closed");
        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.inner.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("channel", &self.inner.channel)
            .field("local_id", &self.inner.local_id)
            .field("ignore_self", &self.inner.ignore_self)
            .finish()
    }
}

/// Spawn the listener and wait for its subscription handshake.
async fn spawn_listener(
    inner: Arc<Inner>,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, WatcherError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = tokio::spawn(listen(inner, shutdown, ready_tx));

    match ready_rx.await {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => Err(WatcherError::Subscribe(err)),
        Err(_) => Err(WatcherError::ListenerGone),
    }
}

async fn listen(
    inner: Arc<Inner>,
    mut shutdown: watch::Receiver<bool>,
    ready: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut stream: PayloadStream = match inner.transport.subscribe(&inner.channel).await {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    debug!(channel = %inner.channel, "Listener subscribed");

    loop {
        let payload = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = stream.next() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        if payload == CLOSE_SENTINEL {
            break;
        }
        inner.deliver(payload).await;
    }

    debug!(channel = %inner.channel, "Listener stopped");
}

impl Inner {
    /// Filter one payload and hand it to the current callback.
    async fn deliver(&self, payload: String) {
        let envelope = match Envelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.log.error(format_args!(
                    "Failed to parse message: {payload} with error: {err}"
                ));
                WATCHER_DECODE_FAILURES
                    .with_label_values(&[&self.channel])
                    .inc();
                return;
            }
        };

        if self.ignore_self && envelope.id == self.local_id {
            WATCHER_SELF_MESSAGES_SKIPPED
                .with_label_values(&[&self.channel])
                .inc();
            return;
        }

        self.log.info(format_args!(
            "received message from channel {}: {}",
            self.channel, envelope.method
        ));
        let method = envelope
            .method
            .parse::<UpdateType>()
            .map(UpdateType::as_str)
            .unwrap_or("unknown");
        WATCHER_MESSAGES_RECEIVED
            .with_label_values(&[&self.channel, method])
            .inc();

        let callback = self.state.lock().await.callback.clone();
        let timer = WATCHER_CALLBACK_DURATION
            .with_label_values(&[&self.channel])
            .start_timer();
        let outcome = AssertUnwindSafe(async move { callback(payload).await })
            .catch_unwind()
            .await;
        timer.observe_duration();

        if let Err(panic) = outcome {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            self.log.error(format_args!(
                "update callback panicked on {method} message: {reason}"
            ));
            WATCHER_CALLBACK_PANICS
                .with_label_values(&[&self.channel])
                .inc();
        }
    }
}

#[async_trait]
impl PolicyNotifier for Watcher {
    async fn notify_update(&self) -> Result<(), PolicyError> {
        self.update().await.map_err(PolicyError::from)
    }

    async fn notify_add_policy(&self, sec: &str, ptype: &str, rule: Rule) -> Result<(), PolicyError> {
        self.update_for_add_policy(sec, ptype, rule)
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<(), PolicyError> {
        self.update_for_remove_policy(sec, ptype, rule)
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<(), PolicyError> {
        self.update_for_remove_filtered_policy(sec, ptype, field_index, field_values)
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_save_policy(&self) -> Result<(), PolicyError> {
        self.update_for_save_policy()
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<(), PolicyError> {
        self.update_for_add_policies(sec, ptype, rules)
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<(), PolicyError> {
        self.update_for_remove_policies(sec, ptype, rules)
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<(), PolicyError> {
        self.update_for_update_policy(sec, ptype, old_rule, new_rule)
            .await
            .map_err(PolicyError::from)
    }

    async fn notify_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<(), PolicyError> {
        self.update_for_update_policies(sec, ptype, old_rules, new_rules)
            .await
            .map_err(PolicyError::from)
    }
}
