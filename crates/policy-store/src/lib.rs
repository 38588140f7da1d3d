//! # Policy Store
//!
//! The policy engine side of policy-sync: an in-memory rule set
//! ([`Enforcer`]) persisted through a storage [`Adapter`].
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - The rule model and its `casbin_rule` row mapping
//! - `ports/` - The storage adapter trait
//! - `adapters/` - In-memory and Postgres (`postgres` feature) storage
//! - `service.rs` - The `Enforcer`
//!
//! ## Usage
//!
//! ```ignore
//! use policy_store::{Enforcer, MemoryAdapter};
//!
//! let enforcer = Arc::new(Enforcer::new(Arc::new(MemoryAdapter::new())).await?);
//! enforcer.set_watcher(watcher.clone());
//! enforcer.add_policy("p", "p", rule(&["alice", "/data", "read"])).await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::MemoryAdapter;
#[cfg(feature = "postgres")]
pub use adapters::PgAdapter;
pub use domain::{CasbinRule, PolicyModel, RowFilter, MAX_RULE_FIELDS};
pub use ports::Adapter;
pub use service::Enforcer;
