//! # Enforcer
//!
//! The local copy of the policy, backed by a storage [`Adapter`] and
//! optionally announcing its mutations through a [`PolicyNotifier`].
//!
//! ## Mutation Paths
//!
//! | Caller | Methods | Storage | Notifier |
//! |--------|---------|---------|----------|
//! | Application | `add_policy`, `remove_policy`, ... | written when auto-save is on | called when attached |
//! | Watcher dispatcher | `self_add_policy`, ... ([`PolicyEngine`]) | untouched | never called |
//!
//! The originating instance persists a change before announcing it, so
//! receivers only update their in-memory model.

use crate::domain::{CasbinRule, PolicyModel};
use crate::ports::outbound::Adapter;
use async_trait::async_trait;
use parking_lot::RwLock;
use policy_types::{
    PolicyEngine, PolicyError, PolicyKey, PolicyNotifier, Rule, DEFAULT_GROUPING_TYPE,
    DEFAULT_POLICY_TYPE, GROUPING_SECTION, POLICY_SECTION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Enforcer {
    model: RwLock<PolicyModel>,
    adapter: Arc<dyn Adapter>,
    watcher: RwLock<Option<Arc<dyn PolicyNotifier>>>,
    auto_save: AtomicBool,
    auto_notify: AtomicBool,
}

impl Enforcer {
    /// Create an enforcer and load every stored rule.
    pub async fn new(adapter: Arc<dyn Adapter>) -> Result<Self, PolicyError> {
        let enforcer = Self {
            model: RwLock::new(PolicyModel::new()),
            adapter,
            watcher: RwLock::new(None),
            auto_save: AtomicBool::new(true),
            auto_notify: AtomicBool::new(true),
        };
        enforcer.reload().await?;
        Ok(enforcer)
    }

    /// Attach the notifier told about every local mutation.
    pub fn set_watcher(&self, watcher: Arc<dyn PolicyNotifier>) {
        *self.watcher.write() = Some(watcher);
    }

    /// Write mutations through to the adapter (default: on).
    pub fn enable_auto_save(&self, enabled: bool) {
        self.auto_save.store(enabled, Ordering::SeqCst);
    }

    /// Announce mutations through the attached notifier (default: on).
    pub fn enable_auto_notify_watcher(&self, enabled: bool) {
        self.auto_notify.store(enabled, Ordering::SeqCst);
    }

    fn auto_save(&self) -> bool {
        self.auto_save.load(Ordering::SeqCst)
    }

    fn notifier(&self) -> Option<Arc<dyn PolicyNotifier>> {
        if self.auto_notify.load(Ordering::SeqCst) {
            self.watcher.read().clone()
        } else {
            None
        }
    }

    async fn reload(&self) -> Result<(), PolicyError> {
        let rows = self.adapter.load_policy().await?;
        let model = PolicyModel::from_rows(&rows);
        debug!(rules = model.len(), "Policy loaded");
        *self.model.write() = model;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Permission rules (`p`, `p`).
    pub fn get_policy(&self) -> Vec<Rule> {
        self.get_named_policy(POLICY_SECTION, DEFAULT_POLICY_TYPE)
    }

    /// Role grouping rules (`g`, `g`).
    pub fn get_grouping_policy(&self) -> Vec<Rule> {
        self.get_named_policy(GROUPING_SECTION, DEFAULT_GROUPING_TYPE)
    }

    pub fn get_named_policy(&self, sec: &str, ptype: &str) -> Vec<Rule> {
        self.model.read().rules(&PolicyKey::new(sec, ptype))
    }

    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.model.read().has(&PolicyKey::new(sec, ptype), rule)
    }

    // =========================================================================
    // Mutations (persisted and announced)
    // =========================================================================

    pub async fn add_policy(&self, sec: &str, ptype: &str, rule: Rule) -> Result<bool, PolicyError> {
        let key = PolicyKey::new(sec, ptype);
        let present = self.model.read().has(&key, &rule);
        if present {
            return Ok(false);
        }

        if self.auto_save() {
            self.adapter.add_policy(sec, ptype, &rule).await?;
        }
        let added = self.model.write().add(&key, rule.clone());
        if !added {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher.notify_add_policy(sec, ptype, rule).await?;
        }
        Ok(true)
    }

    pub async fn add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        let key = PolicyKey::new(sec, ptype);
        let any_present = {
            let model = self.model.read();
            rules.iter().any(|r| model.has(&key, r))
        };
        if any_present {
            return Ok(false);
        }

        if self.auto_save() {
            for rule in &rules {
                self.adapter.add_policy(sec, ptype, rule).await?;
            }
        }
        let added = self.model.write().add_all(&key, rules.clone());
        if !added {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher.notify_add_policies(sec, ptype, rules).await?;
        }
        Ok(true)
    }

    pub async fn remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<bool, PolicyError> {
        let key = PolicyKey::new(sec, ptype);
        let present = self.model.read().has(&key, &rule);
        if !present {
            return Ok(false);
        }

        if self.auto_save() {
            self.adapter.remove_policy(sec, ptype, &rule).await?;
        }
        let removed = self.model.write().remove(&key, &rule);
        if !removed {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher.notify_remove_policy(sec, ptype, rule).await?;
        }
        Ok(true)
    }

    pub async fn remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        let key = PolicyKey::new(sec, ptype);
        let all_present = {
            let model = self.model.read();
            rules.iter().all(|r| model.has(&key, r))
        };
        if !all_present {
            return Ok(false);
        }

        if self.auto_save() {
            for rule in &rules {
                self.adapter.remove_policy(sec, ptype, rule).await?;
            }
        }
        let removed = self.model.write().remove_all(&key, &rules);
        if !removed {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher.notify_remove_policies(sec, ptype, rules).await?;
        }
        Ok(true)
    }

    /// Remove every rule whose fields from `field_index` on match
    /// `field_values`. Empty values match anything.
    pub async fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool, PolicyError> {
        let key = PolicyKey::new(sec, ptype);

        if self.auto_save() {
            self.adapter
                .remove_filtered_policy(sec, ptype, field_index, &field_values)
                .await?;
        }
        let removed = self
            .model
            .write()
            .remove_filtered(&key, field_index, &field_values);
        if removed.is_empty() {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher
                .notify_remove_filtered_policy(sec, ptype, field_index, field_values)
                .await?;
        }
        Ok(true)
    }

    pub async fn update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<bool, PolicyError> {
        let key = PolicyKey::new(sec, ptype);
        let present = self.model.read().has(&key, &old_rule);
        if !present {
            return Ok(false);
        }

        if self.auto_save() {
            self.adapter.remove_policy(sec, ptype, &old_rule).await?;
            self.adapter.add_policy(sec, ptype, &new_rule).await?;
        }
        let updated = self.model.write().update(&key, &old_rule, new_rule.clone());
        if !updated {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher
                .notify_update_policy(sec, ptype, old_rule, new_rule)
                .await?;
        }
        Ok(true)
    }

    pub async fn update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        check_batch_lengths(&old_rules, &new_rules)?;
        let key = PolicyKey::new(sec, ptype);
        let all_present = {
            let model = self.model.read();
            old_rules.iter().all(|r| model.has(&key, r))
        };
        if !all_present {
            return Ok(false);
        }

        if self.auto_save() {
            for (old, new) in old_rules.iter().zip(&new_rules) {
                self.adapter.remove_policy(sec, ptype, old).await?;
                self.adapter.add_policy(sec, ptype, new).await?;
            }
        }
        let updated = self
            .model
            .write()
            .update_all(&key, &old_rules, new_rules.clone());
        if !updated {
            return Ok(false);
        }

        if let Some(watcher) = self.notifier() {
            watcher
                .notify_update_policies(sec, ptype, old_rules, new_rules)
                .await?;
        }
        Ok(true)
    }

    /// Replace the stored policy with the in-memory one and announce it.
    pub async fn save_policy(&self) -> Result<(), PolicyError> {
        let rows = self
            .model
            .read()
            .rows()
            .into_iter()
            .map(|(ptype, rule)| CasbinRule::from_rule(&ptype, &rule))
            .collect::<Result<Vec<_>, _>>()?;
        let count = rows.len();

        self.adapter.save_policy(rows).await?;
        info!(rules = count, "Policy saved");

        if let Some(watcher) = self.notifier() {
            watcher.notify_save_policy().await?;
        }
        Ok(())
    }
}

fn check_batch_lengths(old_rules: &[Rule], new_rules: &[Rule]) -> Result<(), PolicyError> {
    if old_rules.len() != new_rules.len() {
        return Err(PolicyError::InvalidRule(format!(
            "{} old rules but {} new rules",
            old_rules.len(),
            new_rules.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl PolicyEngine for Enforcer {
    async fn self_add_policy(&self, sec: &str, ptype: &str, rule: Rule) -> Result<bool, PolicyError> {
        Ok(self.model.write().add(&PolicyKey::new(sec, ptype), rule))
    }

    async fn self_add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        Ok(self.model.write().add_all(&PolicyKey::new(sec, ptype), rules))
    }

    async fn self_remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: Rule,
    ) -> Result<bool, PolicyError> {
        Ok(self.model.write().remove(&PolicyKey::new(sec, ptype), &rule))
    }

    async fn self_remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        Ok(self
            .model
            .write()
            .remove_all(&PolicyKey::new(sec, ptype), &rules))
    }

    async fn self_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool, PolicyError> {
        let removed = self.model.write().remove_filtered(
            &PolicyKey::new(sec, ptype),
            field_index,
            &field_values,
        );
        Ok(!removed.is_empty())
    }

    async fn self_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Rule,
        new_rule: Rule,
    ) -> Result<bool, PolicyError> {
        Ok(self
            .model
            .write()
            .update(&PolicyKey::new(sec, ptype), &old_rule, new_rule))
    }

    async fn self_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Rule>,
        new_rules: Vec<Rule>,
    ) -> Result<bool, PolicyError> {
        check_batch_lengths(&old_rules, &new_rules)?;
        Ok(self
            .model
            .write()
            .update_all(&PolicyKey::new(sec, ptype), &old_rules, new_rules))
    }

    async fn load_policy(&self) -> Result<(), PolicyError> {
        self.reload().await
    }
}
