//! # Policy Model
//!
//! The in-memory rule set: rules per `(section, policy type)`, kept in
//! insertion order without duplicates.
//!
//! Batch operations are all-or-nothing. Every method returns whether the
//! model changed.

use super::rule_row::CasbinRule;
use policy_types::{matches_filter, PolicyKey, Rule};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    sections: BTreeMap<PolicyKey, Vec<Rule>>,
}

impl PolicyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from stored rows, in row order.
    pub fn from_rows(rows: &[CasbinRule]) -> Self {
        let mut model = Self::new();
        for row in rows {
            let key = PolicyKey::from_ptype(&row.ptype);
            model.add(&key, row.to_rule());
        }
        model
    }

    /// Every rule as a storage row, ids unset.
    pub fn rows(&self) -> Vec<(String, Rule)> {
        self.sections
            .iter()
            .flat_map(|(key, rules)| rules.iter().map(|r| (key.ptype.clone(), r.clone())))
            .collect()
    }

    pub fn rules(&self, key: &PolicyKey) -> Vec<Rule> {
        self.sections.get(key).cloned().unwrap_or_default()
    }

    pub fn has(&self, key: &PolicyKey, rule: &[String]) -> bool {
        self.sections
            .get(key)
            .is_some_and(|rules| rules.iter().any(|r| r == rule))
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, key: &PolicyKey, rule: Rule) -> bool {
        if self.has(key, &rule) {
            return false;
        }
        self.sections.entry(key.clone()).or_default().push(rule);
        true
    }

    /// Add every rule, or none if any is already present.
    pub fn add_all(&mut self, key: &PolicyKey, rules: Vec<Rule>) -> bool {
        if rules.iter().any(|r| self.has(key, r)) || has_duplicates(&rules) {
            return false;
        }
        self.sections.entry(key.clone()).or_default().extend(rules);
        true
    }

    pub fn remove(&mut self, key: &PolicyKey, rule: &[String]) -> bool {
        let Some(rules) = self.sections.get_mut(key) else {
            return false;
        };
        let before = rules.len();
        rules.retain(|r| r != rule);
        rules.len() != before
    }

    /// Remove every rule, or none if any is missing.
    pub fn remove_all(&mut self, key: &PolicyKey, rules: &[Rule]) -> bool {
        if !rules.iter().all(|r| self.has(key, r)) {
            return false;
        }
        if let Some(current) = self.sections.get_mut(key) {
            current.retain(|r| !rules.contains(r));
        }
        true
    }

    /// Remove the rules matching a positional filter and return them.
    pub fn remove_filtered(
        &mut self,
        key: &PolicyKey,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Rule> {
        let Some(rules) = self.sections.get_mut(key) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<Rule>, Vec<Rule>) = std::mem::take(rules)
            .into_iter()
            .partition(|r| matches_filter(r, field_index, field_values));
        *rules = kept;
        removed
    }

    /// Replace `old` in place with `new`.
    pub fn update(&mut self, key: &PolicyKey, old: &[String], new: Rule) -> bool {
        if old != new.as_slice() && self.has(key, &new) {
            return false;
        }
        let Some(slot) = self
            .sections
            .get_mut(key)
            .and_then(|rules| rules.iter_mut().find(|r| r.as_slice() == old))
        else {
            return false;
        };
        *slot = new;
        true
    }

    /// Replace each of `olds` with its counterpart in `news`, or nothing if
    /// any old rule is missing.
    pub fn update_all(&mut self, key: &PolicyKey, olds: &[Rule], news: Vec<Rule>) -> bool {
        if olds.len() != news.len() || !olds.iter().all(|r| self.has(key, r)) {
            return false;
        }
        let mut next = self.clone();
        for (old, new) in olds.iter().zip(news) {
            if !next.update(key, old, new) {
                return false;
            }
        }
        *self = next;
        true
    }
}

fn has_duplicates(rules: &[Rule]) -> bool {
    rules
        .iter()
        .enumerate()
        .any(|(i, r)| rules[..i].contains(r))
}
