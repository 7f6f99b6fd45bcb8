//! Non-recursive mutex over the binary semaphore.

use std::time::Duration;

use minstant::Instant;

use crate::sync::semaphore::BinarySemaphore;

/// A minimal mutual-exclusion lock.
///
/// Unlike [`std::sync::Mutex`] this does not own the data it protects, does
/// not poison, and does not track ownership: `lock` and `unlock` may be
/// called from different threads, which the channel transports rely on.
/// Locking is not recursive.
pub struct Mutex {
    sem: BinarySemaphore,
}

impl Mutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sem: BinarySemaphore::new(true),
        }
    }

    pub fn lock(&self) {
        self.sem.acquire();
    }

    pub fn unlock(&self) {
        self.sem.release();
    }

    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.sem.try_acquire()
    }

    #[must_use]
    pub fn try_lock_until(&self, deadline: Instant) -> bool {
        self.sem.try_acquire_until(deadline)
    }

    #[must_use]
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        self.sem.try_acquire_for(timeout)
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
