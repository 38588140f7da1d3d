//! Port traits.

pub mod outbound;

pub use outbound::Adapter;
