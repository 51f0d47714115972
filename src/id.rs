//! Identifier generation. Only the contract is relied upon elsewhere: ids are
//! positive, unique across the deployment, and safe to request from any
//! thread.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> i64;
}

/// Snowflake-style layout: 41 bits of milliseconds since a fixed epoch,
/// 6 bits of worker id (0-63), 16 bits of per-millisecond sequence.
const WORKER_BITS: u8 = 6;
const SEQUENCE_BITS: u8 = 16;
pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

/// 2024-01-01T00:00:00Z in unix milliseconds.
const EPOCH_MS: i64 = 1_704_067_200_000;

#[derive(Debug)]
pub struct SnowflakeIdGenerator {
    worker_id: i64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_ms: i64,
    sequence: i64,
}

impl SnowflakeIdGenerator {
    pub fn new(worker_id: u16) -> Self {
        let worker_id = i64::from(worker_id.min(MAX_WORKER_ID));
        SnowflakeIdGenerator {
            worker_id,
            state: Mutex::new(State::default()),
        }
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_id(&self) -> i64 {
        let mut state = self.state.lock().expect("id state poisoned");
        let mut now = Self::now_ms();
        // Clock going backwards: stick with the last timestamp and keep using
        // the sequence until real time catches up.
        if now < state.last_ms {
            now = state.last_ms;
        }
        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;
        ((now - EPOCH_MS) << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_positive_and_monotonic() {
        let gen = SnowflakeIdGenerator::new(3);
        let mut last = 0;
        for _ in 0..1000 {
            let id = gen.next_id();
            assert!(id > 0);
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn concurrent_ids_are_unique() {
        let gen = Arc::new(SnowflakeIdGenerator::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let gen = gen.clone();
            handles.push(std::thread::spawn(move || {
                (0..500).map(|_| gen.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
    }

    #[test]
    fn worker_id_is_clamped() {
        let gen = SnowflakeIdGenerator::new(u16::MAX);
        assert!(gen.next_id() > 0);
    }
}
