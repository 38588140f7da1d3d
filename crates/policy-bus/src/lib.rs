//! # Policy Bus - Channel Transport for Policy Change Announcements
//!
//! Abstraction over a publish/subscribe broker. A payload published on a
//! named channel is delivered, in publish order, to every subscription that
//! was active on that channel at publish time.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Watcher A   │                    │  Watcher B   │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │   Channel    │          │
//!                  │  Transport   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery Model
//!
//! - **Fire-and-forget:** `publish` reports only whether the broker accepted
//!   the payload, never whether anyone received it.
//! - **No durability:** a subscription started after a publish never sees it.
//! - **Per-channel order:** payloads arrive in the order the broker accepted
//!   them; nothing is promised across channels.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broker;
pub mod subscription;
pub mod transport;

pub use broker::InMemoryBroker;
pub use subscription::Subscription;
pub use transport::{ChannelTransport, PayloadStream, TransportError};

/// Maximum payloads buffered per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
