//! Counting and binary semaphores.
//!
//! The counting semaphore packs its permit counter and its parked-thread
//! counter into one 64-bit atomic word so that both can move in a single
//! compare-exchange. The futex itself targets only the 32-bit permit half:
//! waiters park expecting a permit count of zero and re-examine the whole
//! word after every wake.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use minstant::Instant;

use crate::sync::wait;

/// Permit counter in the low half, parked-thread counter in the high half.
const fn pack(value: u32, waiting: u32) -> u64 {
    (waiting as u64) << 32 | value as u64
}

const fn value_of(state: u64) -> u32 {
    state as u32
}

const fn waiting_of(state: u64) -> u32 {
    (state >> 32) as u32
}

/// A counting semaphore.
///
/// Holds up to [`Semaphore::MAX`] permits. [`acquire`](Self::acquire) takes a
/// permit, blocking while none are available; [`release`](Self::release)
/// returns permits and wakes as many parked threads as it can satisfy.
pub struct Semaphore {
    state: AtomicU64,
}

impl Semaphore {
    /// The largest permit count the counter can represent.
    pub const MAX: u32 = u32::MAX;

    /// Creates a semaphore holding `permits` permits.
    #[must_use]
    pub const fn new(permits: u32) -> Self {
        Self {
            state: AtomicU64::new(pack(permits, 0)),
        }
    }

    /// Adds `permits` permits and wakes up to that many parked threads.
    ///
    /// Releasing zero permits is a no-op. The permit counter overflowing
    /// [`Semaphore::MAX`] is the caller's responsibility (checked in debug
    /// builds).
    pub fn release(&self, permits: u32) {
        if permits == 0 {
            return;
        }
        let mut prev = self.state.load(Ordering::Relaxed);
        loop {
            debug_assert!(value_of(prev).checked_add(permits).is_some());
            let next = pack(value_of(prev).wrapping_add(permits), waiting_of(prev));
            match self
                .state
                .compare_exchange_weak(prev, next, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => prev = observed,
            }
        }
        let waiting = waiting_of(prev);
        if waiting != 0 {
            wait::wake(self.value_cell(), permits.min(waiting));
        }
    }

    /// Takes one permit, blocking until one is available.
    pub fn acquire(&self) {
        let cur = self.state.load(Ordering::Relaxed);
        if value_of(cur) != 0
            && self
                .state
                .compare_exchange(
                    cur,
                    pack(value_of(cur) - 1, waiting_of(cur)),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
        {
            return;
        }

        let mut cur = self.register_waiter(cur);
        loop {
            if value_of(cur) == 0 {
                wait::wait(self.value_cell(), 0);
                cur = self.state.load(Ordering::Relaxed);
            } else {
                match self.state.compare_exchange_weak(
                    cur,
                    pack(value_of(cur) - 1, waiting_of(cur) - 1),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(observed) => cur = observed,
                }
            }
        }
    }

    /// Takes one permit without blocking.
    ///
    /// Returns `false` if no permit was available.
    pub fn try_acquire(&self) -> bool {
        let mut cur = self.state.load(Ordering::Relaxed);
        while value_of(cur) != 0 {
            match self.state.compare_exchange(
                cur,
                pack(value_of(cur) - 1, waiting_of(cur)),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
        false
    }

    /// As [`acquire`](Self::acquire), but gives up at `deadline`.
    pub fn try_acquire_until(&self, deadline: Instant) -> bool {
        let cur = self.state.load(Ordering::Relaxed);
        if value_of(cur) != 0
            && self
                .state
                .compare_exchange(
                    cur,
                    pack(value_of(cur) - 1, waiting_of(cur)),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
        {
            return true;
        }

        let mut cur = self.register_waiter(cur);
        loop {
            let now = Instant::now();
            if now >= deadline {
                self.unregister_waiter(cur);
                return false;
            }
            if value_of(cur) == 0 {
                wait::wait_for(self.value_cell(), 0, deadline - now);
                cur = self.state.load(Ordering::Relaxed);
            } else {
                match self.state.compare_exchange(
                    cur,
                    pack(value_of(cur) - 1, waiting_of(cur) - 1),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return true,
                    Err(observed) => cur = observed,
                }
            }
        }
    }

    /// As [`acquire`](Self::acquire), but gives up after `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        self.try_acquire_until(Instant::now() + timeout)
    }

    fn register_waiter(&self, mut cur: u64) -> u64 {
        loop {
            let next = pack(value_of(cur), waiting_of(cur) + 1);
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => cur = observed,
            }
        }
    }

    fn unregister_waiter(&self, mut cur: u64) {
        loop {
            let next = pack(value_of(cur), waiting_of(cur) - 1);
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
    }

    /// The futex cell: the permit half of the packed word.
    fn value_cell(&self) -> &AtomicU32 {
        let ptr = self.state.as_ptr().cast::<AtomicU32>();
        // SAFETY: the packed word has the size and alignment of two
        // consecutive `AtomicU32`s, and the permit counter occupies the first
        // on little-endian targets and the second on big-endian ones. The
        // kernel only ever reads the word; all stores go through `state`.
        unsafe { &*ptr.add(usize::from(cfg!(target_endian = "big"))) }
    }
}

/// A binary semaphore, the building block of [`Mutex`](crate::sync::mutex::Mutex).
///
/// Three states: available, taken, and taken-with-waiters. A thread that was
/// ever woken out of [`acquire`](Self::acquire) restores the contended state
/// before returning, so the next release still wakes someone. This costs one
/// spurious wake in the uncontended case but is required for correctness.
pub struct BinarySemaphore {
    value: AtomicU32,
}

const AVAILABLE: u32 = 1;
const TAKEN: u32 = 0;
const CONTENDED: u32 = u32::MAX;

impl BinarySemaphore {
    /// Creates a binary semaphore, optionally holding its single permit.
    #[must_use]
    pub const fn new(available: bool) -> Self {
        Self {
            value: AtomicU32::new(if available { AVAILABLE } else { TAKEN }),
        }
    }

    /// Makes the permit available and wakes one waiter if any was parked.
    pub fn release(&self) {
        if self.value.swap(AVAILABLE, Ordering::AcqRel) == CONTENDED {
            wait::wake(&self.value, 1);
        }
    }

    /// Takes the permit, blocking until it is available.
    pub fn acquire(&self) {
        let mut next = TAKEN;
        let mut prev = self.value.load(Ordering::Relaxed);
        loop {
            if prev == AVAILABLE {
                match self.value.compare_exchange(
                    AVAILABLE,
                    next,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(observed) => {
                        prev = observed;
                        continue;
                    }
                }
            }
            if self.mark_contended(&mut prev) {
                next = CONTENDED;
                wait::wait(&self.value, CONTENDED);
                prev = self.value.load(Ordering::Relaxed);
            }
        }
    }

    /// Takes the permit without blocking.
    pub fn try_acquire(&self) -> bool {
        self.value
            .compare_exchange(AVAILABLE, TAKEN, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// As [`acquire`](Self::acquire), but gives up at `deadline`.
    ///
    /// A timed-out acquire may leave the semaphore in the contended state,
    /// which costs the next release a wake call with no one parked.
    pub fn try_acquire_until(&self, deadline: Instant) -> bool {
        let mut next = TAKEN;
        let mut prev = self.value.load(Ordering::Relaxed);
        loop {
            if prev == AVAILABLE {
                match self.value.compare_exchange(
                    AVAILABLE,
                    next,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return true,
                    Err(observed) => {
                        prev = observed;
                        continue;
                    }
                }
            }
            if self.mark_contended(&mut prev) {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                next = CONTENDED;
                wait::wait_for(&self.value, CONTENDED, deadline - now);
                prev = self.value.load(Ordering::Relaxed);
            }
        }
    }

    /// As [`acquire`](Self::acquire), but gives up after `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        self.try_acquire_until(Instant::now() + timeout)
    }

    /// Moves the semaphore into the contended state so the next release
    /// wakes. Returns `false` (with `prev` refreshed) if the state moved
    /// under us and the caller should re-examine it instead of parking.
    fn mark_contended(&self, prev: &mut u32) -> bool {
        if *prev == CONTENDED {
            return true;
        }
        match self
            .value
            .compare_exchange(*prev, CONTENDED, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => true,
            Err(observed) => {
                *prev = observed;
                false
            }
        }
    }
}
