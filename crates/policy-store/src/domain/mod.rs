//! Domain layer: the in-memory rule set and its storage row mapping.

pub mod model;
pub mod rule_row;

pub use model::PolicyModel;
pub use rule_row::{CasbinRule, RowFilter, MAX_RULE_FIELDS};
