//! One-shot countdown gate.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::sync::wait;

/// A single-use countdown gate.
///
/// The latch starts at an expected count. [`count_down`](Self::count_down)
/// subtracts from it; every [`wait`](Self::wait) returns once the count
/// reaches zero, and stays open from then on. The count never goes back up.
pub struct Latch {
    value: AtomicU32,
}

impl Latch {
    /// Creates a latch that opens after `expected` arrivals.
    #[must_use]
    pub const fn new(expected: u32) -> Self {
        Self {
            value: AtomicU32::new(expected),
        }
    }

    /// Subtracts `n` from the count, waking all waiters on reaching zero.
    pub fn count_down(&self, n: u32) {
        let prev = self.value.fetch_sub(n, Ordering::Release);
        debug_assert!(prev >= n);
        if prev == n {
            // Unlike the semaphore, the wake is unconditional: a latch that
            // just opened almost always has someone parked on it.
            wait::wake_all(&self.value);
        }
    }

    /// Returns `true` once the count has reached zero, without blocking.
    #[must_use]
    pub fn try_wait(&self) -> bool {
        self.value.load(Ordering::Acquire) == 0
    }

    /// Blocks until the count reaches zero.
    pub fn wait(&self) {
        loop {
            let cur = self.value.load(Ordering::Acquire);
            if cur == 0 {
                return;
            }
            wait::wait(&self.value, cur);
        }
    }

    /// Counts down by `n` and waits for the remainder to arrive.
    pub fn arrive_and_wait(&self, n: u32) {
        let prev = self.value.fetch_sub(n, Ordering::AcqRel);
        debug_assert!(prev >= n);
        let mut cur = prev - n;
        if cur == 0 {
            wait::wake_all(&self.value);
            return;
        }
        loop {
            wait::wait(&self.value, cur);
            cur = self.value.load(Ordering::Acquire);
            if cur == 0 {
                return;
            }
        }
    }
}
