use std::sync::atomic::{AtomicI64, Ordering};

use crate::clock::Clock;

/// Ids at or above this value are local placeholders, never server ids.
///
/// Server ids are small row ids; tentative ids are millisecond timestamps
/// (2001-09-09T01:46:40Z and later), so the two ranges never meet.
pub const OPTIMISTIC_ID_THRESHOLD: i64 = 1_000_000_000_000;

/// True when `id` belongs to a not-yet-confirmed local message.
pub fn is_tentative(id: i64) -> bool {
    id >= OPTIMISTIC_ID_THRESHOLD
}

/// Hands out tentative message ids.
///
/// Ids are the current millisecond timestamp, bumped when two sends land in
/// the same millisecond so each placeholder stays unique.
#[derive(Debug, Default)]
pub struct TentativeIds {
    last: AtomicI64,
}

impl TentativeIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, clock: &dyn Clock) -> i64 {
        let now = clock.now_millis().max(OPTIMISTIC_ID_THRESHOLD);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}
