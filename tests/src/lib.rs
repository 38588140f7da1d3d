//! # Policy-Sync Test Suite
//!
//! Unified test crate for scenarios that span more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs       # Nodes: enforcer + watcher on a shared broker
//!     ├── delivery.rs       # Cross-instance delivery, filtering, shutdown
//!     ├── publishing.rs     # Concurrent publishes, publish failures, metrics
//!     └── enforcer_sync.rs  # Two enforcers kept in step end to end
//!
//! tests/benches/
//! └── watcher_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p policy-sync-tests
//! cargo test -p policy-sync-tests integration::delivery::
//! cargo bench -p policy-sync-tests
//! ```

#![allow(dead_code)]

pub mod integration;
