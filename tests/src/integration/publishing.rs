//! # Publishing
//!
//! 1. **Concurrency**: parallel `update_for_*` calls produce whole,
//!    non-overlapping transport publishes
//! 2. **Failure Surfacing**: a rejected publish reaches the caller and the log
//! 3. **Metrics**: published and received traffic is counted per channel

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{broker, eventually, recording_watcher, Node};
    use policy_store::MemoryAdapter;
    use policy_telemetry::{
        encode_metrics, register_metrics, WATCHER_MESSAGES_PUBLISHED, WATCHER_MESSAGES_RECEIVED,
        WATCHER_PUBLISH_FAILURES,
    };
    use policy_types::{rule, PolicyError};
    use policy_watcher::test_utils::{RecordingLog, RecordingTransport};
    use policy_watcher::{
        sync_callback, ChangeMessage, PolicyChange, Watcher, WatcherError, WatcherOptions,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    // =========================================================================
    // CONCURRENCY
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_are_serialized() {
        const N: usize = 32;
        let transport = Arc::new(RecordingTransport::new(broker()));
        let watcher = Arc::new(
            Watcher::new(
                WatcherOptions::new()
                    .with_transport(transport.clone())
                    .with_log(Arc::new(RecordingLog::new()))
                    .with_callback(sync_callback(|_| {}))
                    .with_channel("it.concurrent")
                    .with_local_id("A")
                    .no_subscribe(true),
            )
            .await
            .unwrap(),
        );

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let watcher = watcher.clone();
                tokio::spawn(async move {
                    watcher
                        .update_for_add_policy("p", "p", rule(&[format!("user{i}"), "/data".into(), "read".into()]))
                        .await
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let payloads = transport.payloads("it.concurrent");
        assert_eq!(payloads.len(), N);
        assert_eq!(transport.max_in_flight(), 1);

        let users: HashSet<String> = payloads
            .iter()
            .map(|p| match ChangeMessage::decode(p).unwrap().change {
                PolicyChange::AddPolicy { rule, .. } => rule[0].clone(),
                other => panic!("unexpected change {other:?}"),
            })
            .collect();
        assert_eq!(users.len(), N);
    }

    // =========================================================================
    // FAILURE SURFACING
    // =========================================================================

    #[tokio::test]
    async fn test_publish_failure_reaches_caller() {
        let transport = Arc::new(RecordingTransport::new(broker()));
        let (watcher, _engine, log) =
            recording_watcher(transport.clone(), "it.reject", "A", true).await;

        transport.reject_publishes(true);
        let err = watcher
            .update_for_update_policy("p", "p", rule(&["a"]), rule(&["b"]))
            .await
            .unwrap_err();

        assert!(matches!(err, WatcherError::Publish(_)));
        assert_eq!(
            log.errors(),
            vec!["[UpdateForUpdatePolicy] err: Rejected by broker: publishes disabled"]
        );
        assert!(WATCHER_PUBLISH_FAILURES.with_label_values(&["it.reject"]).get() >= 1.0);
    }

    #[tokio::test]
    async fn test_enforcer_reports_notify_failure_after_local_change() {
        let transport = Arc::new(RecordingTransport::new(broker()));
        let node = Node::start(
            transport.clone(),
            Arc::new(MemoryAdapter::new()),
            "it.notify",
            "A",
        )
        .await;

        transport.reject_publishes(true);
        let err = node
            .enforcer
            .add_policy("p", "p", rule(&["alice", "/data", "read"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PolicyError::Notify(_)));
        assert!(node
            .enforcer
            .has_policy("p", "p", &rule(&["alice", "/data", "read"])));
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    #[tokio::test]
    async fn test_traffic_is_counted() {
        let _ = register_metrics();
        let bus = broker();
        let (a, _, _) = recording_watcher(bus.clone(), "it.metrics", "A", true).await;
        let (_b, engine_b, _) = recording_watcher(bus.clone(), "it.metrics", "B", true).await;

        a.update_for_save_policy().await.unwrap();
        assert!(eventually(|| engine_b.calls().len() == 1).await);

        assert!(
            WATCHER_MESSAGES_PUBLISHED
                .with_label_values(&["it.metrics", "UpdateForSavePolicy"])
                .get()
                >= 1.0
        );
        assert!(
            WATCHER_MESSAGES_RECEIVED
                .with_label_values(&["it.metrics", "UpdateForSavePolicy"])
                .get()
                >= 1.0
        );
        let text = encode_metrics().unwrap();
        assert!(text.contains("policy_watcher_messages_received_total"));
    }
}
