//! Synchronization primitives parked directly on 32-bit memory cells.
//!
//! Every primitive in this module is a thin state machine over one atomic
//! word, using the platform's address-waiting facility (futex on Linux,
//! `__ulock_*` on macOS) to block and wake threads. None of them allocate.
//!
//! - [`Event`](event::Event) - auto-reset broadcast signal
//! - [`Semaphore`](semaphore::Semaphore) / [`BinarySemaphore`](semaphore::BinarySemaphore)
//! - [`Mutex`](mutex::Mutex) - non-recursive lock over the binary semaphore
//! - [`Latch`](latch::Latch) - one-shot countdown gate

pub mod event;
pub mod latch;
pub mod mutex;
pub mod semaphore;

pub(crate) mod wait;
