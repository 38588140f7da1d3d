//! # Policy Ports
//!
//! The two seams between a local policy engine and the change watcher.
//!
//! - [`PolicyEngine`]: implemented by the engine, driven by the watcher's
//!   dispatcher when a remote change arrives. The `self_*` primitives mutate
//!   local state only and MUST NOT notify the watcher again.
//! - [`PolicyNotifier`]: implemented by the watcher, called by the engine
//!   after a local mutation so that every other instance applies it too.

use crate::entities::Rule;
use crate::errors::PolicyError;
use async_trait::async_trait;

/// Self-mutation primitives of a local policy engine.
///
/// Every mutation returns `Ok(true)` when the local state changed,
/// `Ok(false)` when the engine declined it (e.g. rule already present),
/// and `Err` when the engine failed.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Add one rule.
    async fn self_add_policy(&self, sec: &str, ptype: &str, rule: Rule)
        -> Result<bool, PolicyError>;

    /// Add a batch of rules. All or nothing.
    async fn self_add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError>;

    /// Remove one rule.
    async fn self_remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<bool, PolicyError>;

    /// Remove a batch of rules. All or nothing.
    async fn self_remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError>;

    /// Remove every rule matching `field_values` from position `field_index` on.
    async fn self_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool, PolicyError>;

    /// Replace `old_rule` with `new_rule`.
    async fn self_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<bool, PolicyError>;

    /// Replace each of `old_rules` with the rule at the same position in `new_rules`.
    async fn self_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<bool, PolicyError>;

    /// Discard local state and reload everything from storage.
    async fn load_policy(&self) -> Result<(), PolicyError>;
}

/// Announces local policy mutations to other instances.
///
/// One operation per mutation kind. Errors only ever describe the publish
/// itself; what remote instances do with the announcement is invisible here.
#[async_trait]
pub trait PolicyNotifier: Send + Sync {
    /// Ask every instance to reload everything.
    async fn notify_update(&self) -> Result<(), PolicyError>;

    /// A rule was added.
    async fn notify_add_policy(&self, sec: &str, ptype: &str, rule: Rule)
        -> Result<(), PolicyError>;

    /// A rule was removed.
    async fn notify_remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<(), PolicyError>;

    /// Rules matching a filter were removed.
    async fn notify_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<(), PolicyError>;

    /// The whole policy was saved.
    async fn notify_save_policy(&self) -> Result<(), PolicyError>;

    /// A batch of rules was added.
    async fn notify_add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<(), PolicyError>;

    /// A batch of rules was removed.
    async fn notify_remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<(), PolicyError>;

    /// A rule was replaced.
    async fn notify_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<(), PolicyError>;

    /// A batch of rules was replaced.
    async fn notify_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<(), PolicyError>;
}
