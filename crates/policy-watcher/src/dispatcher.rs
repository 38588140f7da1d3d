//! # Callback Dispatcher
//!
//! Turns a received change message into the matching self-mutation on the
//! local policy engine.
//!
//! | Change | Engine call |
//! |--------|-------------|
//! | `Update`, `SavePolicy` | `load_policy` |
//! | `AddPolicy` / `RemovePolicy` | `self_add_policy` / `self_remove_policy` |
//! | `AddPolicies` / `RemovePolicies` | `self_add_policies` / `self_remove_policies` |
//! | `RemoveFilteredPolicy` | `self_remove_filtered_policy` |
//! | `UpdatePolicy` / `UpdatePolicies` | `self_update_policy` / `self_update_policies` |
//!
//! Failures never leave the dispatcher: a bad payload, an engine error or a
//! declined mutation each become one error log line.

use crate::log::WatcherLog;
use crate::message::{ChangeMessage, PolicyChange};
use futures::future::{BoxFuture, FutureExt};
use policy_telemetry::WATCHER_APPLY_FAILURES;
use policy_types::{PolicyEngine, PolicyError};
use std::future::Future;
use std::sync::Arc;

/// Invoked with the raw payload of every delivered message.
///
/// The listener awaits the returned future before taking the next message.
pub type UpdateCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap a plain closure as an [`UpdateCallback`].
pub fn sync_callback<F>(f: F) -> UpdateCallback
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Arc::new(move |payload: String| {
        f(&payload);
        futures::future::ready(()).boxed()
    })
}

/// Wrap an async closure as an [`UpdateCallback`].
pub fn async_callback<F, Fut>(f: F) -> UpdateCallback
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload: String| f(payload).boxed())
}

/// The callback installed when no custom one is configured.
pub fn default_update_callback(
    engine: Arc<dyn PolicyEngine>,
    log: Arc<dyn WatcherLog>,
) -> UpdateCallback {
    async_callback(move |payload: String| {
        let engine = engine.clone();
        let log = log.clone();
        async move {
            dispatch(engine.as_ref(), log.as_ref(), &payload).await;
        }
    })
}

/// Decode `payload` and apply it to `engine`.
///
/// Returns whether the engine applied the change.
pub async fn dispatch(engine: &dyn PolicyEngine, log: &dyn WatcherLog, payload: &str) -> bool {
    let msg = match ChangeMessage::decode(payload) {
        Ok(msg) => msg,
        Err(err) => {
            log.error(format_args!("{err}"));
            WATCHER_APPLY_FAILURES.with_label_values(&["invalid"]).inc();
            return false;
        }
    };

    let method = msg.update_type();
    match apply_change(engine, msg.change).await {
        Ok(true) => true,
        Ok(false) => {
            log.error(format_args!("callback update policy failed"));
            WATCHER_APPLY_FAILURES
                .with_label_values(&[method.as_str()])
                .inc();
            false
        }
        Err(err) => {
            log.error(format_args!("callback err: {err}"));
            WATCHER_APPLY_FAILURES
                .with_label_values(&[method.as_str()])
                .inc();
            false
        }
    }
}

/// Apply one change to the engine.
pub async fn apply_change(
    engine: &dyn PolicyEngine,
    change: PolicyChange,
) -> Result<bool, PolicyError> {
    match change {
        PolicyChange::Update | PolicyChange::SavePolicy => {
            engine.load_policy().await?;
            Ok(true)
        }
        PolicyChange::AddPolicy { sec, ptype, rule } => {
            engine.self_add_policy(&sec, &ptype, rule).await
        }
        PolicyChange::RemovePolicy { sec, ptype, rule } => {
            engine.self_remove_policy(&sec, &ptype, rule).await
        }
        PolicyChange::RemoveFilteredPolicy {
            sec,
            ptype,
            field_index,
            field_values,
        } => {
            engine
                .self_remove_filtered_policy(&sec, &ptype, field_index, field_values)
                .await
        }
        PolicyChange::AddPolicies { sec, ptype, rules } => {
            engine.self_add_policies(&sec, &ptype, rules).await
        }
        PolicyChange::RemovePolicies { sec, ptype, rules } => {
            engine.self_remove_policies(&sec, &ptype, rules).await
        }
        PolicyChange::UpdatePolicy {
            sec,
            ptype,
            old_rule,
            new_rule,
        } => {
            engine
                .self_update_policy(&sec, &ptype, old_rule, new_rule)
                .await
        }
        PolicyChange::UpdatePolicies {
            sec,
            ptype,
            old_rules,
            new_rules,
        } => {
            engine
                .self_update_policies(&sec, &ptype, old_rules, new_rules)
                .await
        }
    }
}
