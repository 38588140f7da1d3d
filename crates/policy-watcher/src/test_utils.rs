//! Test doubles for the watcher's collaborators.
//!
//! Shared by this crate's unit tests and the workspace integration suite.

use crate::log::WatcherLog;
use async_trait::async_trait;
use parking_lot::Mutex;
use policy_bus::{ChannelTransport, InMemoryBroker, PayloadStream, TransportError};
use policy_types::{PolicyEngine, PolicyError, Rule};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Logger that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl WatcherLog for RecordingLog {
    fn info(&self, args: fmt::Arguments<'_>) {
        self.infos.lock().push(args.to_string());
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.errors.lock().push(args.to_string());
    }
}

/// Policy engine that records each call and answers with a fixed result.
pub struct RecordingEngine {
    calls: Mutex<Vec<String>>,
    answer: Mutex<Result<bool, PolicyError>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            answer: Mutex::new(Ok(true)),
        }
    }

    /// Answer every mutation with `answer`.
    #[must_use]
    pub fn answering(self, answer: Result<bool, PolicyError>) -> Self {
        *self.answer.lock() = answer;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<bool, PolicyError> {
        self.calls.lock().push(call);
        self.answer.lock().clone()
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyEngine for RecordingEngine {
    async fn self_add_policy(&self, sec: &str, ptype: &str, rule: Rule) -> Result<bool, PolicyError> {
        self.record(format!("self_add_policy {sec} {ptype} {rule:?}"))
    }

    async fn self_add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        self.record(format!("self_add_policies {sec} {ptype} {rules:?}"))
    }

    async fn self_remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<bool, PolicyError> {
        self.record(format!("self_remove_policy {sec} {ptype} {rule:?}"))
    }

    async fn self_remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        self.record(format!("self_remove_policies {sec} {ptype} {rules:?}"))
    }

    async fn self_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool, PolicyError> {
        self.record(format!(
            "self_remove_filtered_policy {sec} {ptype} {field_index} {field_values:?}"
        ))
    }

    async fn self_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<bool, PolicyError> {
        self.record(format!(
            "self_update_policy {sec} {ptype} {old_rule:?} {new_rule:?}"
        ))
    }

    async fn self_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        self.record(format!(
            "self_update_policies {sec} {ptype} {old_rules:?} {new_rules:?}"
        ))
    }

    async fn load_policy(&self) -> Result<(), PolicyError> {
        self.record("load_policy".to_string()).map(|_| ())
    }
}

/// Transport that records every publish and forwards to an in-memory broker.
///
/// Also tracks how many publishes overlap, and can be told to reject
/// publishes.
pub struct RecordingTransport {
    broker: Arc<InMemoryBroker>,
    published: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reject: AtomicBool,
}

impl RecordingTransport {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            published: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
        }
    }

    /// Reject (or stop rejecting) every publish.
    pub fn reject_publishes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// `(channel, payload)` of every accepted publish, in order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// Payloads published on `channel`.
    pub fn payloads(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Highest number of publishes observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("publishes disabled".to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Give overlapping publishers a chance to interleave.
        tokio::task::yield_now().await;

        self.published
            .lock()
            .push((channel.to_string(), payload.clone()));
        let result = self.broker.publish(channel, payload).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, TransportError> {
        self.broker.subscribe(channel).await
    }
}
