//! # Storage Rows
//!
//! A rule is stored as one row of the `casbin_rule` table: its policy type
//! and up to six positional values. Unused positions hold the empty string.

use policy_types::{Rule, StorageError};

/// Positional value columns per row.
pub const MAX_RULE_FIELDS: usize = 6;

/// One stored rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CasbinRule {
    pub id: i64,
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: String,
    pub v4: String,
    pub v5: String,
}

impl CasbinRule {
    /// Row for `rule` under `ptype`. The id is assigned by storage.
    pub fn from_rule(ptype: &str, rule: &[String]) -> Result<Self, StorageError> {
        if rule.len() > MAX_RULE_FIELDS {
            return Err(StorageError::RowTooLong {
                len: rule.len(),
                max: MAX_RULE_FIELDS,
            });
        }

        let mut row = Self {
            ptype: ptype.to_string(),
            ..Self::default()
        };
        for (slot, value) in row.values_mut().into_iter().zip(rule) {
            *slot = value.clone();
        }
        Ok(row)
    }

    /// The rule held by this row. Empty positions are skipped.
    #[must_use]
    pub fn to_rule(&self) -> Rule {
        self.values()
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The six value columns in order.
    #[must_use]
    pub fn values(&self) -> [&str; MAX_RULE_FIELDS] {
        [
            &self.v0, &self.v1, &self.v2, &self.v3, &self.v4, &self.v5,
        ]
    }

    fn values_mut(&mut self) -> [&mut String; MAX_RULE_FIELDS] {
        [
            &mut self.v0,
            &mut self.v1,
            &mut self.v2,
            &mut self.v3,
            &mut self.v4,
            &mut self.v5,
        ]
    }

    /// Same policy type and values, ignoring the id.
    #[must_use]
    pub fn same_rule(&self, other: &CasbinRule) -> bool {
        self.ptype == other.ptype && self.values() == other.values()
    }
}

/// Row constraints for a filtered removal.
///
/// Field index `i` with values `[x, y, ..]` constrains `v_i = x`,
/// `v_{i+1} = y` and so on. Empty values constrain nothing. A non-empty
/// value past the last column makes the filter match no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub ptype: String,
    pub columns: [Option<String>; MAX_RULE_FIELDS],
    unsatisfiable: bool,
}

impl RowFilter {
    pub fn new(ptype: &str, field_index: usize, field_values: &[String]) -> Self {
        let mut columns: [Option<String>; MAX_RULE_FIELDS] = Default::default();
        let mut unsatisfiable = false;
        for (offset, value) in field_values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match field_index
                .checked_add(offset)
                .and_then(|position| columns.get_mut(position))
            {
                Some(slot) => *slot = Some(value.clone()),
                None => unsatisfiable = true,
            }
        }
        Self {
            ptype: ptype.to_string(),
            columns,
            unsatisfiable,
        }
    }

    /// Whether no stored row can match.
    pub fn is_unsatisfiable(&self) -> bool {
        self.unsatisfiable
    }

    #[must_use]
    pub fn matches(&self, row: &CasbinRule) -> bool {
        !self.unsatisfiable
            && row.ptype == self.ptype
            && self
                .columns
                .iter()
                .zip(row.values())
                .all(|(want, have)| want.as_deref().map_or(true, |w| w == have))
    }

    /// `(column name, value)` for every constrained column.
    pub fn constraints(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_deref().map(|v| (format!("v{i}"), v)))
    }
}
