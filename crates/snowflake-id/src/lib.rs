//! # Snowflake IDs
//!
//! 32-bit identifiers built from a millisecond clock, a machine id and a
//! per-millisecond sequence.
//!
//! ## Layout (before truncation to 32 bits)
//!
//! ```text
//! ┌──────────────────────────┬────────────┬──────────────┐
//! │ ms since 2022-01-01 +08  │ machine: 5 │ sequence: 12 │
//! └──────────────────────────┴────────────┴──────────────┘
//! ```
//!
//! Only the low 32 bits are kept, so the clock part wraps roughly every
//! 32.7 seconds. IDs are unique within one generator as long as callers do
//! not hold on to them across a wrap.

use parking_lot::Mutex;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// 2022-01-01T00:00:00+08:00 in milliseconds.
pub const EPOCH_MS: i64 = 1_640_966_400_000;

pub const MACHINE_ID_BITS: u8 = 5;
pub const SEQUENCE_BITS: u8 = 12;
pub const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_MACHINE_ID: i64 = (1 << MACHINE_ID_BITS) - 1;

/// Prefix that replaces the leading digits of an enterprise id.
const EID_PREFIX: &str = "888";

/// Generator of user and enterprise ids for one machine.
#[derive(Debug)]
pub struct IdGenerator {
    machine_id: i64,
    state: Mutex<ClockState>,
}

#[derive(Debug, Default)]
struct ClockState {
    timestamp: i64,
    sequence: i64,
}

impl IdGenerator {
    /// Generator for `machine_id`. Ids outside `1..=31` are replaced by a
    /// random machine id.
    pub fn new(machine_id: i64) -> Self {
        let machine_id = if (1..=MAX_MACHINE_ID).contains(&machine_id) {
            machine_id
        } else {
            rand::thread_rng().gen_range(0..=MAX_MACHINE_ID)
        };
        Self {
            machine_id,
            state: Mutex::new(ClockState::default()),
        }
    }

    pub fn machine_id(&self) -> i64 {
        self.machine_id
    }

    /// Next user id.
    ///
    /// When the sequence overflows within one millisecond this spins until
    /// the clock moves on.
    pub fn next_uid(&self) -> u32 {
        let mut state = self.state.lock();

        let mut now = now_ms();
        if state.timestamp == now {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                while now <= state.timestamp {
                    std::hint::spin_loop();
                    now = now_ms();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.timestamp = now;

        pack(state.timestamp, self.machine_id, state.sequence)
    }

    /// Enterprise id for a caller-chosen `sequence`, without locking.
    ///
    /// The packed value is rendered in decimal and its first four digits
    /// are replaced by `888`.
    pub fn next_eid(&self, sequence: i64) -> u32 {
        enterprise_id(pack(now_ms(), self.machine_id, sequence))
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Pack the three parts and keep the low 32 bits.
fn pack(timestamp: i64, machine_id: i64, sequence: i64) -> u32 {
    let packed = ((timestamp - EPOCH_MS) << (MACHINE_ID_BITS + SEQUENCE_BITS))
        | (machine_id << SEQUENCE_BITS)
        | sequence;
    packed as u32
}

fn enterprise_id(packed: u32) -> u32 {
    let digits = packed.to_string();
    let rendered = match digits.get(4..) {
        Some(rest) if !rest.is_empty() => format!("{EID_PREFIX}{rest}"),
        _ => format!("{EID_PREFIX}{digits}"),
    };
    rendered.parse().unwrap_or(packed)
}
