//! Rendezvous (zero-capacity) transport.
//!
//! # Algorithm
//!
//! A single slot handed off under a mutex that the consumer holds between
//! rendezvous:
//!
//! - a sender takes the `throttle` mutex (one rendezvous attempt at a time),
//!   briefly takes the slot mutex to place the item, signals `item_ready`,
//!   and parks on `can_leave`
//! - the receiver releases the slot mutex, waits for `item_ready`, re-takes
//!   the mutex, signals `can_leave`, and moves the item out
//! - the last sender disconnects by signaling `item_ready` with an empty
//!   slot, which the receiver reads as the end; once the sender count is
//!   zero and the slot is empty, receives report the end without starting
//!   a handshake no one could finish
//!
//! Every successful transfer blocks both sides, so the try variants refuse
//! immediately (after the closed checks, which take precedence).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

use minstant::Instant;

use crate::mpsc::{RecvResult, SendResult, Status};
use crate::sync::event::Event;
use crate::sync::mutex::Mutex;
use crate::trace::trace;

/// Producer-side serialization, on its own cache line.
#[repr(C)]
#[repr(align(64))]
struct ProducerSide {
    throttle: Mutex,
    count: AtomicIsize,
}

/// The slot and its handshake state.
#[repr(C)]
#[repr(align(64))]
struct SharedSide<T> {
    open: AtomicBool,
    item_lock: Mutex,
    item_ready: Event,
    item: UnsafeCell<Option<T>>,
    can_leave: Event,
}

pub(crate) struct Rendezvous<T: Send> {
    producer: ProducerSide,
    shared: SharedSide<T>,
}

// SAFETY: the slot is only touched while `item_lock` is held; everything else
// is atomics and wait/wake primitives.
unsafe impl<T: Send> Send for Rendezvous<T> {}
unsafe impl<T: Send> Sync for Rendezvous<T> {}

impl<T: Send> Rendezvous<T> {
    pub(crate) fn new() -> Self {
        let ch = Self {
            producer: ProducerSide {
                throttle: Mutex::new(),
                count: AtomicIsize::new(1),
            },
            shared: SharedSide {
                open: AtomicBool::new(true),
                item_lock: Mutex::new(),
                item_ready: Event::new(false),
                item: UnsafeCell::new(None),
                can_leave: Event::new(false),
            },
        };
        // The consumer owns the slot whenever it is not mid-handshake.
        ch.shared.item_lock.lock();
        ch
    }

    pub(crate) fn send(&self, value: T) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }

        self.producer.throttle.lock();
        self.shared.item_lock.lock();
        // SAFETY: slot access is exclusive while `item_lock` is held.
        unsafe { *self.shared.item.get() = Some(value) };
        self.shared.item_lock.unlock();
        self.shared.item_ready.signal();
        self.shared.can_leave.wait();
        self.producer.throttle.unlock();
        SendResult::ok()
    }

    pub(crate) fn try_send(&self, value: T) -> SendResult<T> {
        // The call can never succeed, but reporting a closed channel as
        // merely "would block" would mislead retry loops.
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }
        SendResult::fail(Status::WouldBlock, value)
    }

    pub(crate) fn try_send_until(&self, value: T, deadline: Instant) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }

        if !self.producer.throttle.try_lock_until(deadline) {
            return SendResult::fail(Status::Timeout, value);
        }
        if !self.shared.item_lock.try_lock_until(deadline) {
            self.producer.throttle.unlock();
            return SendResult::fail(Status::Timeout, value);
        }
        // SAFETY: slot access is exclusive while `item_lock` is held.
        unsafe { *self.shared.item.get() = Some(value) };
        self.shared.item_lock.unlock();
        self.shared.item_ready.signal();
        // Committed: the consumer will take the item, so the remaining wait
        // is not bounded by the deadline.
        self.shared.can_leave.wait();
        self.producer.throttle.unlock();
        SendResult::ok()
    }

    pub(crate) fn receive(&self) -> RecvResult<T> {
        if self.drained() {
            return RecvResult::fail(Status::Closed);
        }

        self.shared.item_lock.unlock();
        self.shared.item_ready.wait();
        self.shared.item_lock.lock();
        self.shared.can_leave.signal();
        self.collect()
    }

    pub(crate) fn try_receive(&self) -> RecvResult<T> {
        if self.drained() {
            return RecvResult::fail(Status::Closed);
        }
        // A still-full slot or a live sender means a blocking receive could
        // make progress; this call just refuses to be the one that blocks.
        RecvResult::fail(Status::WouldBlock)
    }

    pub(crate) fn try_receive_until(&self, deadline: Instant) -> RecvResult<T> {
        if self.drained() {
            return RecvResult::fail(Status::Closed);
        }

        self.shared.item_lock.unlock();
        let signaled = self.shared.item_ready.wait_until(deadline);
        self.shared.item_lock.lock();
        self.shared.can_leave.signal();
        if !signaled {
            return RecvResult::fail(Status::Timeout);
        }
        self.collect()
    }

    pub(crate) fn connect(&self) {
        self.producer.count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn disconnect(&self) {
        if self.producer.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!("last sender gone, signaling empty slot");
            self.shared.item_ready.signal();
        }
    }

    pub(crate) fn close(&self) {
        self.shared.open.store(false, Ordering::Release);
    }

    /// True once no sender exists and nothing is left in the slot. Two
    /// `item_ready` signals can merge into one observable state (an item
    /// published against a stale `can_leave` plus the disconnect sentinel),
    /// so the end of the channel is judged from the count and the slot
    /// rather than from the event.
    ///
    /// The slot peek is sound: the consumer holds `item_lock` outside an
    /// active handshake, and with the count at zero no sender can be inside
    /// one.
    fn drained(&self) -> bool {
        self.producer.count.load(Ordering::Acquire) <= 0
            && unsafe { (*self.shared.item.get()).is_none() }
    }

    /// Takes the slot's contents with `item_lock` held. An empty slot is the
    /// disconnect sentinel; the lock is kept so the consumer still owns the
    /// settled slot.
    fn collect(&self) -> RecvResult<T> {
        // SAFETY: slot access is exclusive while `item_lock` is held.
        match unsafe { (*self.shared.item.get()).take() } {
            Some(value) => RecvResult::ok(value),
            None => RecvResult::fail(Status::Closed),
        }
    }
}
