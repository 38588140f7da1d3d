//! # Error Types
//!
//! Defines error types used across the policy crates.

use thiserror::Error;

/// Errors from the persistence layer behind a policy engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A rule has more positional fields than a storage row can hold.
    #[error("Rule has {len} fields, storage rows hold at most {max}")]
    RowTooLong { len: usize, max: usize },
}

/// Errors raised by a policy engine while applying a mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The storage adapter rejected the operation.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The change could not be announced to other instances.
    #[error("Notify error: {0}")]
    Notify(String),

    /// Malformed rule arguments (e.g. mismatched batch lengths).
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
