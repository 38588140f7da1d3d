//! # Policy Entities
//!
//! A rule is an ordered tuple of string fields. Rules are addressed by a
//! section (`p` for permissions, `g` for role grouping) and a policy type
//! within that section (`p`, `p2`, `g`, `g2`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One policy statement or grouping relationship, e.g. `["alice", "/data", "read"]`.
pub type Rule = Vec<String>;

/// Section holding permission rules.
pub const POLICY_SECTION: &str = "p";

/// Section holding role-grouping rules.
pub const GROUPING_SECTION: &str = "g";

/// Default permission policy type.
pub const DEFAULT_POLICY_TYPE: &str = "p";

/// Default grouping policy type.
pub const DEFAULT_GROUPING_TYPE: &str = "g";

/// Address of a rule category inside the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyKey {
    /// Section (`p` or `g`).
    pub sec: String,
    /// Policy type inside the section.
    pub ptype: String,
}

impl PolicyKey {
    /// Create a key from a section and policy type.
    pub fn new(sec: impl Into<String>, ptype: impl Into<String>) -> Self {
        Self {
            sec: sec.into(),
            ptype: ptype.into(),
        }
    }

    /// Key of the default permission rules (`p`, `p`).
    #[must_use]
    pub fn policy() -> Self {
        Self::new(POLICY_SECTION, DEFAULT_POLICY_TYPE)
    }

    /// Key of the default grouping rules (`g`, `g`).
    #[must_use]
    pub fn grouping() -> Self {
        Self::new(GROUPING_SECTION, DEFAULT_GROUPING_TYPE)
    }

    /// Section inferred from a policy type (`g2` lives in `g`, `p2` in `p`).
    #[must_use]
    pub fn from_ptype(ptype: &str) -> Self {
        let sec = if ptype.starts_with(GROUPING_SECTION) {
            GROUPING_SECTION
        } else {
            POLICY_SECTION
        };
        Self::new(sec, ptype)
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sec, self.ptype)
    }
}

/// Build a [`Rule`] from string slices.
pub fn rule<S: AsRef<str>>(fields: &[S]) -> Rule {
    fields.iter().map(|f| f.as_ref().to_string()).collect()
}

/// Whether `rule` matches a positional filter starting at `field_index`.
///
/// An empty filter value is a wildcard for its position. A position past
/// `usize::MAX` matches nothing.
#[must_use]
pub fn matches_filter(rule: &[String], field_index: usize, field_values: &[String]) -> bool {
    field_values.iter().enumerate().all(|(offset, value)| {
        if value.is_empty() {
            return true;
        }
        field_index
            .checked_add(offset)
            .and_then(|position| rule.get(position))
            .is_some_and(|field| field == value)
    })
}
