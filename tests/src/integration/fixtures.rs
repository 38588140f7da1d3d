//! Shared setup for the integration scenarios.

use policy_bus::{ChannelTransport, InMemoryBroker};
use policy_store::{Enforcer, MemoryAdapter};
use policy_watcher::test_utils::{RecordingEngine, RecordingLog};
use policy_watcher::{Watcher, WatcherOptions};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for anything the scenarios wait on.
pub const WAIT: Duration = Duration::from_secs(2);

/// One process: a policy engine kept in step by a watcher.
pub struct Node {
    pub enforcer: Arc<Enforcer>,
    pub watcher: Arc<Watcher>,
    pub log: Arc<RecordingLog>,
}

impl Node {
    /// Start a node whose enforcer announces every mutation.
    pub async fn start(
        transport: Arc<dyn ChannelTransport>,
        storage: Arc<MemoryAdapter>,
        channel: &str,
        local_id: &str,
    ) -> Self {
        let enforcer = Arc::new(Enforcer::new(storage).await.expect("enforcer"));
        let log = Arc::new(RecordingLog::new());
        let watcher = Arc::new(
            Watcher::new(
                WatcherOptions::new()
                    .with_transport(transport)
                    .with_engine(enforcer.clone())
                    .with_log(log.clone())
                    .with_channel(channel)
                    .with_local_id(local_id)
                    .ignore_self(true),
            )
            .await
            .expect("watcher"),
        );
        enforcer.set_watcher(watcher.clone());

        Self {
            enforcer,
            watcher,
            log,
        }
    }
}

/// A watcher bound to a recording engine.
pub async fn recording_watcher(
    transport: Arc<dyn ChannelTransport>,
    channel: &str,
    local_id: &str,
    ignore_self: bool,
) -> (Watcher, Arc<RecordingEngine>, Arc<RecordingLog>) {
    let engine = Arc::new(RecordingEngine::new());
    let log = Arc::new(RecordingLog::new());
    let watcher = Watcher::new(
        WatcherOptions::new()
            .with_transport(transport)
            .with_engine(engine.clone())
            .with_log(log.clone())
            .with_channel(channel)
            .with_local_id(local_id)
            .ignore_self(ignore_self),
    )
    .await
    .expect("watcher");
    (watcher, engine, log)
}

pub fn broker() -> Arc<InMemoryBroker> {
    Arc::new(InMemoryBroker::new())
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
