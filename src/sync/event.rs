//! Auto-reset broadcast event.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use minstant::Instant;

use crate::sync::wait;

/// A reusable, automatic-reset signal.
///
/// An event is either signaled or unsignaled. Threads that wait on an
/// unsignaled event join its wait queue; a signal releases every thread that
/// had already started waiting. A thread that consumed a signal and waits
/// again blocks until the next one.
///
/// State lives in a single incrementing counter: odd values are signaled,
/// even values mean the event associated with the next value has not fired
/// yet. Signaling advances to the next odd value; a successful wait advances
/// past it to the next even value.
pub struct Event {
    value: AtomicU32,
}

impl Event {
    /// Creates an event, optionally already signaled.
    #[must_use]
    pub const fn new(signaled: bool) -> Self {
        Self {
            value: AtomicU32::new(if signaled { 1 } else { 0 }),
        }
    }

    /// Signals the event, releasing every current waiter.
    pub fn signal(&self) {
        let mut prev = self.value.load(Ordering::Relaxed);
        loop {
            let next = prev.wrapping_add(1) | 1;
            match self
                .value
                .compare_exchange(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => prev = observed,
            }
        }
        // Only wake if the event was unsignaled; a signaled event demands
        // that no one was asleep.
        if !is_signaled(prev) {
            wait::wake_all(&self.value);
        }
    }

    /// Blocks until the event is signaled, consuming the signal.
    pub fn wait(&self) {
        let mut prev = self.value.load(Ordering::Acquire);
        if is_signaled(prev) {
            match self.value.compare_exchange(
                prev,
                prev.wrapping_add(1),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => {
                    if is_signaled(observed) {
                        return;
                    }
                    prev = observed;
                }
            }
        }

        let target = prev.wrapping_add(1);
        loop {
            wait::wait(&self.value, prev);
            prev = self.value.load(Ordering::Relaxed);
            if prev >= target {
                break;
            }
        }
        let _ = self.value.compare_exchange(
            target,
            target.wrapping_add(1),
            Ordering::Release,
            Ordering::Relaxed,
        );
    }

    /// As [`wait`](Self::wait), but gives up at `deadline`.
    ///
    /// Returns `false` on timeout. A deadline at or before now fails without
    /// blocking.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut prev = self.value.load(Ordering::Acquire);
        if is_signaled(prev) {
            match self.value.compare_exchange(
                prev,
                prev.wrapping_add(1),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => {
                    if is_signaled(observed) {
                        return true;
                    }
                    prev = observed;
                }
            }
        }

        let target = prev.wrapping_add(1);
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            wait::wait_for(&self.value, prev, deadline - now);
            prev = self.value.load(Ordering::Relaxed);
            if prev >= target {
                break;
            }
        }
        let _ = self.value.compare_exchange(
            target,
            target.wrapping_add(1),
            Ordering::Release,
            Ordering::Relaxed,
        );
        true
    }

    /// As [`wait`](Self::wait), but gives up after `timeout`.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}

const fn is_signaled(value: u32) -> bool {
    value & 1 == 1
}
