use crate::domain::{CasbinRule, RowFilter};
use crate::ports::outbound::Adapter;
use async_trait::async_trait;
use parking_lot::RwLock;
use policy_types::StorageError;

/// In-process rule table for tests and single-node setups.
///
/// Share one instance between enforcers to model a shared database.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    table: RwLock<Table>,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<CasbinRule>,
    next_id: i64,
}

impl Table {
    fn insert(&mut self, mut row: CasbinRule) {
        self.next_id += 1;
        row.id = self.next_id;
        self.rows.push(row);
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter pre-filled with `(ptype, rule)` pairs.
    pub fn with_rules<I>(rules: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let adapter = Self::new();
        {
            let mut table = adapter.table.write();
            for (ptype, rule) in rules {
                table.insert(CasbinRule::from_rule(&ptype, &rule)?);
            }
        }
        Ok(adapter)
    }

    /// Snapshot of the stored rows.
    pub fn rows(&self) -> Vec<CasbinRule> {
        self.table.read().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn load_policy(&self) -> Result<Vec<CasbinRule>, StorageError> {
        Ok(self.rows())
    }

    async fn save_policy(&self, rows: Vec<CasbinRule>) -> Result<(), StorageError> {
        let mut table = self.table.write();
        table.rows.clear();
        for row in rows {
            table.insert(row);
        }
        Ok(())
    }

    async fn add_policy(
        &self,
        _sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), StorageError> {
        let row = CasbinRule::from_rule(ptype, rule)?;
        let mut table = self.table.write();
        if !table.rows.iter().any(|r| r.same_rule(&row)) {
            table.insert(row);
        }
        Ok(())
    }

    async fn remove_policy(
        &self,
        _sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), StorageError> {
        let row = CasbinRule::from_rule(ptype, rule)?;
        self.table.write().rows.retain(|r| !r.same_rule(&row));
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<(), StorageError> {
        let filter = RowFilter::new(ptype, field_index, field_values);
        self.table.write().rows.retain(|r| !filter.matches(r));
        Ok(())
    }
}
