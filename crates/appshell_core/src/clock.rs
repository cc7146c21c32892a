//! Time sources for document stamping and install-prompt suppression.
//!
//! # Invariants
//! - All timestamps are Unix epoch milliseconds.
//! - `SystemClock` readings are strictly increasing across every instance in
//!   one process, so a write stamped after another write always carries a
//!   later timestamp even when two services each own a clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix epoch milliseconds.
pub type EpochMs = i64;

/// Milliseconds in one day.
pub const DAY_MS: EpochMs = 24 * 60 * 60 * 1000;

/// Injected time source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> EpochMs;
}

/// Last reading handed out by any `SystemClock` in this process.
static LAST_MS: AtomicI64 = AtomicI64::new(0);

/// Wall clock with a process-wide monotonic guard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> EpochMs {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as EpochMs)
            .unwrap_or(0);

        let mut previous = LAST_MS.load(Ordering::Acquire);
        loop {
            let next = wall.max(previous + 1);
            match LAST_MS.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: EpochMs) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: EpochMs) {
        self.now.store(now_ms, Ordering::Release);
    }

    pub fn advance(&self, delta_ms: EpochMs) {
        self.now.fetch_add(delta_ms, Ordering::AcqRel);
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(days * DAY_MS);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> EpochMs {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock, SystemClock, DAY_MS};

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut previous = clock.now_ms();
        for _ in 0..1_000 {
            let next = clock.now_ms();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn separate_system_clocks_share_one_sequence() {
        let first = SystemClock::new();
        let second = SystemClock::new();
        let mut previous = first.now_ms();
        for _ in 0..500 {
            let a = second.now_ms();
            let b = first.now_ms();
            assert!(a > previous);
            assert!(b > a);
            previous = b;
        }
    }

    #[test]
    fn manual_clock_advances_by_days() {
        let clock = ManualClock::new(1_000);
        clock.advance_days(2);
        assert_eq!(clock.now_ms(), 1_000 + 2 * DAY_MS);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
