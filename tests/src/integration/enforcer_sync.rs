//! # Enforcer Synchronization
//!
//! Two nodes share one rule store, the way two service replicas share one
//! database. Each node's enforcer persists and announces its own changes;
//! the other node applies them to its in-memory model only.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{broker, eventually, Node};
    use policy_store::MemoryAdapter;
    use policy_types::{rule, PolicyEngine};
    use std::sync::Arc;

    async fn pair(channel: &str) -> (Node, Node, Arc<MemoryAdapter>) {
        let bus = broker();
        let storage = Arc::new(MemoryAdapter::new());
        let a = Node::start(bus.clone(), storage.clone(), channel, "A").await;
        let b = Node::start(bus.clone(), storage.clone(), channel, "B").await;
        (a, b, storage)
    }

    #[tokio::test]
    async fn test_grouping_changes_follow_across_nodes() {
        let (a, b, storage) = pair("it.sync.grouping").await;

        a.enforcer
            .add_policies(
                "g",
                "g",
                vec![
                    rule(&["alice", "admin"]),
                    rule(&["bob", "admin"]),
                    rule(&["carol", "viewer"]),
                ],
            )
            .await
            .unwrap();
        assert!(eventually(|| b.enforcer.get_grouping_policy().len() == 3).await);

        b.enforcer
            .remove_filtered_policy("g", "g", 1, rule(&["admin"]))
            .await
            .unwrap();
        assert!(eventually(|| a.enforcer.get_grouping_policy().len() == 1).await);

        assert_eq!(a.enforcer.get_grouping_policy(), vec![rule(&["carol", "viewer"])]);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_update_follows_across_nodes() {
        let (a, b, _storage) = pair("it.sync.update").await;

        a.enforcer
            .add_policy("p", "p", rule(&["alice", "/data", "read"]))
            .await
            .unwrap();
        assert!(eventually(|| !b.enforcer.get_policy().is_empty()).await);

        a.enforcer
            .update_policy(
                "p",
                "p",
                rule(&["alice", "/data", "read"]),
                rule(&["alice", "/data", "write"]),
            )
            .await
            .unwrap();

        assert!(
            eventually(|| b
                .enforcer
                .has_policy("p", "p", &rule(&["alice", "/data", "write"])))
            .await
        );
        assert_eq!(b.enforcer.get_policy().len(), 1);
    }

    #[tokio::test]
    async fn test_save_policy_makes_peers_reload() {
        let (a, b, storage) = pair("it.sync.save").await;

        // Local-only change on B, never persisted.
        b.enforcer
            .self_add_policy("p", "p", rule(&["drift"]))
            .await
            .unwrap();
        a.enforcer.enable_auto_save(false);
        a.enforcer.enable_auto_notify_watcher(false);
        a.enforcer
            .add_policy("p", "p", rule(&["alice", "/data", "read"]))
            .await
            .unwrap();
        a.enforcer.enable_auto_notify_watcher(true);

        a.enforcer.save_policy().await.unwrap();

        assert!(
            eventually(|| b.enforcer.get_policy() == vec![rule(&["alice", "/data", "read"])])
                .await
        );
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_own_changes_are_not_applied_twice() {
        let (a, b, _storage) = pair("it.sync.once").await;

        a.enforcer.add_policy("p", "p", rule(&["x"])).await.unwrap();
        b.enforcer.add_policy("p", "p", rule(&["y"])).await.unwrap();

        assert!(eventually(|| a.enforcer.get_policy().len() == 2).await);
        assert!(eventually(|| b.enforcer.get_policy().len() == 2).await);
        assert!(a.log.errors().is_empty());
        assert!(b.log.errors().is_empty());
    }
}
