//! # Policy Types Crate
//!
//! Vocabulary shared by every crate of the policy-sync workspace.
//!
//! ## Contents
//!
//! - **Entities**: [`Rule`] and the well-known section / policy-type names.
//! - **Errors**: [`PolicyError`] for engine mutations, [`StorageError`] for
//!   the persistence layer.
//! - **Ports**: [`PolicyEngine`] (the local engine a watcher applies remote
//!   changes to) and [`PolicyNotifier`] (the publishing side an engine calls
//!   after a local mutation).
//!
//! ```text
//! ┌──────────────┐  PolicyNotifier   ┌──────────────┐
//! │   Enforcer   │ ────────────────→ │   Watcher    │
//! │ (local copy) │ ←──────────────── │ (pub/sub)    │
//! └──────────────┘   PolicyEngine    └──────────────┘
//! ```

pub mod engine;
pub mod entities;
pub mod errors;

pub use engine::{PolicyEngine, PolicyNotifier};
pub use entities::*;
pub use errors::*;
