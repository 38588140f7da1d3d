//! # Outbound Ports (Driven Ports)
//!
//! Persistence required by the [`Enforcer`](crate::Enforcer).
//!
//! Production: `PgAdapter` (feature `postgres`)
//! Testing: `MemoryAdapter`

use crate::domain::CasbinRule;
use async_trait::async_trait;
use policy_types::StorageError;

/// Rule storage keyed by policy type and up to six positional values.
///
/// Section arguments are accepted for symmetry with the engine API; rows
/// are addressed by policy type only.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Every stored row.
    async fn load_policy(&self) -> Result<Vec<CasbinRule>, StorageError>;

    /// Replace the stored rows with `rows`.
    async fn save_policy(&self, rows: Vec<CasbinRule>) -> Result<(), StorageError>;

    /// Store one rule. A no-op when an identical row exists.
    async fn add_policy(&self, sec: &str, ptype: &str, rule: &[String])
        -> Result<(), StorageError>;

    /// Delete the row holding exactly this rule.
    async fn remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), StorageError>;

    /// Delete every row matching the filter. See [`RowFilter`](crate::RowFilter).
    async fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<(), StorageError>;
}
