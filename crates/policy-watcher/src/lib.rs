//! # Policy Watcher
//!
//! Keeps the policy engines of many processes in step. Each process runs one
//! [`Watcher`]: local mutations are announced on a shared channel, and
//! mutations announced by other processes are applied to the local engine.
//!
//! ## Message Flow
//!
//! ```text
//!  Process A                                         Process B
//! ┌──────────┐ update_for_*  ┌─────────┐ ChangeMessage ┌─────────┐ dispatch ┌──────────┐
//! │ Enforcer │ ────────────→ │ Watcher │ ────────────→ │ Watcher │ ───────→ │ Enforcer │
//! └──────────┘               └─────────┘   (channel)   └─────────┘  self_*  └──────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A change published after [`Watcher::new`] returns reaches every
//!   subscribed watcher that existed at publish time.
//! - Per-channel delivery order is the broker's order.
//! - A malformed or failing message costs one log line. The listener keeps
//!   running.
//! - Publish failures are returned to the caller. Remote apply failures are
//!   only visible in the remote process's logs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use policy_watcher::{TracingLog, Watcher, WatcherOptions};
//!
//! let watcher = Watcher::new(
//!     WatcherOptions::from_env()
//!         .with_transport(broker)
//!         .with_engine(enforcer.clone())
//!         .with_log(Arc::new(TracingLog))
//!         .ignore_self(true),
//! )
//! .await?;
//! watcher.update_for_add_policy("p", "p", rule(&["alice", "/data", "read"])).await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dispatcher;
pub mod error;
pub mod log;
pub mod message;
pub mod options;

/// Recording doubles for the transport, engine and logger seams.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub mod watcher;

pub use dispatcher::{
    apply_change, async_callback, default_update_callback, dispatch, sync_callback,
    UpdateCallback,
};
pub use error::{ConfigError, WatcherError};
pub use log::{TracingLog, WatcherLog};
pub use message::{ChangeMessage, Envelope, MessageError, PolicyChange, UpdateType, CLOSE_SENTINEL};
pub use options::{WatcherOptions, DEFAULT_CHANNEL};
pub use watcher::Watcher;
