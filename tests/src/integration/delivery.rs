//! # Cross-Instance Delivery
//!
//! ```text
//! [Watcher A] ──publish──→ [Broker channel] ──→ [Watcher B] ──dispatch──→ [Engine B]
//! ```
//!
//! 1. **Happy Path**: single and batch changes reach the other instance
//! 2. **Self-Filtering**: own messages never reach the own engine
//! 3. **Resilience**: malformed payloads cost a log line, nothing more
//! 4. **Shutdown**: the close sentinel ends the listener task

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{broker, eventually, recording_watcher, Node};
    use policy_bus::ChannelTransport;
    use policy_store::MemoryAdapter;
    use policy_types::rule;
    use policy_watcher::{ChangeMessage, PolicyChange, CLOSE_SENTINEL};
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // HAPPY PATH
    // =========================================================================

    #[tokio::test]
    async fn test_add_policy_applied_exactly_once_on_peer() {
        let bus = broker();
        let (a, _engine_a, _) = recording_watcher(bus.clone(), "it.add", "A", false).await;
        let (_b, engine_b, log_b) = recording_watcher(bus.clone(), "it.add", "B", false).await;

        a.update_for_add_policy("p", "p", rule(&["alice", "/data", "read"]))
            .await
            .unwrap();

        assert!(eventually(|| !engine_b.calls().is_empty()).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            engine_b.calls(),
            vec!["self_add_policy p p [\"alice\", \"/data\", \"read\"]"]
        );
        assert!(log_b.errors().is_empty());
    }

    #[tokio::test]
    async fn test_peer_enforcer_contains_published_rule() {
        let bus = broker();
        let a = Node::start(bus.clone(), Arc::new(MemoryAdapter::new()), "it.state", "A").await;
        let b = Node::start(bus.clone(), Arc::new(MemoryAdapter::new()), "it.state", "B").await;

        a.enforcer
            .add_policy("p", "p", rule(&["alice", "/data", "read"]))
            .await
            .unwrap();

        assert!(
            eventually(|| b
                .enforcer
                .has_policy("p", "p", &rule(&["alice", "/data", "read"])))
            .await
        );
    }

    #[tokio::test]
    async fn test_batch_applied_in_order() {
        let bus = broker();
        let a = Node::start(bus.clone(), Arc::new(MemoryAdapter::new()), "it.batch", "A").await;
        let b = Node::start(bus.clone(), Arc::new(MemoryAdapter::new()), "it.batch", "B").await;

        let rules = vec![
            rule(&["alice", "/data", "read"]),
            rule(&["bob", "/data", "write"]),
            rule(&["carol", "/logs", "read"]),
        ];
        a.enforcer
            .add_policies("p", "p", rules.clone())
            .await
            .unwrap();

        assert!(eventually(|| !b.enforcer.get_policy().is_empty()).await);
        assert_eq!(b.enforcer.get_policy(), rules);
    }

    // =========================================================================
    // SELF-FILTERING
    // =========================================================================

    #[tokio::test]
    async fn test_ignore_self_skips_own_messages() {
        let bus = broker();
        let (a, engine_a, _) = recording_watcher(bus.clone(), "it.self", "A", true).await;
        let (_b, engine_b, _) = recording_watcher(bus.clone(), "it.self", "B", true).await;

        a.update().await.unwrap();

        // A foreign message behind A's own one marks when A's listener is done.
        let foreign = ChangeMessage::new("C", PolicyChange::SavePolicy)
            .encode()
            .unwrap();
        bus.publish("it.self", foreign).await.unwrap();

        assert!(eventually(|| engine_a.calls().len() == 1).await);
        assert!(eventually(|| engine_b.calls().len() == 2).await);
        assert_eq!(engine_a.calls(), vec!["load_policy"]);
    }

    #[tokio::test]
    async fn test_without_ignore_self_own_messages_are_applied() {
        let bus = broker();
        let (a, engine_a, _) = recording_watcher(bus.clone(), "it.noself", "A", false).await;

        a.update_for_remove_policy("p", "p", rule(&["bob"]))
            .await
            .unwrap();

        assert!(eventually(|| engine_a.calls().len() == 1).await);
        assert_eq!(engine_a.calls(), vec!["self_remove_policy p p [\"bob\"]"]);
    }

    // =========================================================================
    // RESILIENCE
    // =========================================================================

    #[tokio::test]
    async fn test_malformed_payload_does_not_stop_listener() {
        let bus = broker();
        let (b, engine_b, log_b) = recording_watcher(bus.clone(), "it.garbage", "B", true).await;

        bus.publish("it.garbage", "not a change message".to_string())
            .await
            .unwrap();
        bus.publish("it.garbage", r#"{"Method":"UpdateForTeleport","ID":"X"}"#.to_string())
            .await
            .unwrap();
        let valid = ChangeMessage::new(
            "A",
            PolicyChange::AddPolicy {
                sec: "p".into(),
                ptype: "p".into(),
                rule: rule(&["dave", "/x", "read"]),
            },
        )
        .encode()
        .unwrap();
        bus.publish("it.garbage", valid).await.unwrap();

        assert!(eventually(|| engine_b.calls().len() == 1).await);
        assert!(b.is_subscribed().await);

        let errors = log_b.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Failed to parse message: not a change message"));
        assert_eq!(errors[1], "unknown update type: UpdateForTeleport");
    }

    #[tokio::test]
    async fn test_out_of_range_filter_index_does_not_stop_listener() {
        let bus = broker();
        let a = Node::start(bus.clone(), Arc::new(MemoryAdapter::new()), "it.index", "A").await;
        let b = Node::start(bus.clone(), Arc::new(MemoryAdapter::new()), "it.index", "B").await;

        a.enforcer
            .add_policy("p", "p", rule(&["alice", "/data", "read"]))
            .await
            .unwrap();
        assert!(eventually(|| b.enforcer.get_policy().len() == 1).await);

        let huge_index = ChangeMessage::new(
            "C",
            PolicyChange::RemoveFilteredPolicy {
                sec: "p".into(),
                ptype: "p".into(),
                field_index: usize::MAX,
                field_values: rule(&["", "x"]),
            },
        )
        .encode()
        .unwrap();
        bus.publish("it.index", huge_index).await.unwrap();

        a.enforcer
            .add_policy("p", "p", rule(&["bob", "/data", "write"]))
            .await
            .unwrap();

        assert!(eventually(|| b.enforcer.get_policy().len() == 2).await);
        assert!(b.watcher.is_subscribed().await);
        assert!(b
            .enforcer
            .has_policy("p", "p", &rule(&["alice", "/data", "read"])));
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    #[tokio::test]
    async fn test_sentinel_stops_listener_without_callback() {
        let bus = broker();
        let (b, engine_b, _) = recording_watcher(bus.clone(), "it.sentinel", "B", false).await;

        bus.publish("it.sentinel", CLOSE_SENTINEL.to_string())
            .await
            .unwrap();
        assert!(eventually(|| bus.subscriber_count("it.sentinel") == 0).await);
        assert!(!b.is_subscribed().await);

        // Nothing is listening any more.
        let late = ChangeMessage::new("A", PolicyChange::Update).encode().unwrap();
        bus.publish("it.sentinel", late).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(engine_b.calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_joins_listener_and_rejects_second_close() {
        let bus = broker();
        let (a, _, _) = recording_watcher(bus.clone(), "it.close", "A", false).await;
        assert_eq!(bus.subscriber_count("it.close"), 1);

        a.close().await.unwrap();
        assert_eq!(bus.subscriber_count("it.close"), 0);
        assert!(a.close().await.is_err());
    }

    #[tokio::test]
    async fn test_channels_do_not_cross() {
        let bus = broker();
        let (a, _, _) = recording_watcher(bus.clone(), "it.left", "A", false).await;
        let (_b, engine_b, _) = recording_watcher(bus.clone(), "it.right", "B", false).await;

        a.update().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(engine_b.calls().is_empty());
    }
}
