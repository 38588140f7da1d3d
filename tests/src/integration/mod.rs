//! # Integration Scenarios
//!
//! Every scenario runs several watchers against one in-memory broker, the
//! way separate processes share one pub/sub server.

pub mod delivery;
pub mod enforcer_sync;
pub mod fixtures;
pub mod publishing;
