//! Bounded linked-queue transport.
//!
//! # Algorithm
//!
//! The live list is the same dummy-head FIFO as the unbounded transport, but
//! nodes come from a pre-allocated pool of `capacity + 2` (one dummy head,
//! one perpetually-retired node being recycled, `capacity` free). Producers
//! pop a node off the free list with a CAS, fill it, and append it to the
//! live tail; the consumer pushes each consumed dummy back onto the free
//! list through its private `retired` pointer. A semaphore initialized to
//! `capacity` gates producers, so the steady-state send/receive path never
//! allocates.
//!
//! Disconnect may allocate one extra node: announcing the end must never
//! block on a free-list permit.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, Ordering};

use minstant::Instant;

use crate::mpsc::{RecvResult, SendResult, Status};
use crate::sync::event::Event;
use crate::sync::semaphore::Semaphore;
use crate::trace::trace;

struct Node<T> {
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Consumer-owned state: the dummy head and the recycle point.
#[repr(C)]
#[repr(align(64))] // own cache line to avoid false sharing with producers
struct ConsumerSide<T> {
    first: UnsafeCell<*mut Node<T>>,
    /// Tail of the free list; consumed dummies are linked in behind it.
    retired: UnsafeCell<*mut Node<T>>,
}

/// State touched by both sides.
#[repr(C)]
#[repr(align(64))]
struct SharedSide {
    permits: Semaphore,
    ready: Event,
    open: AtomicBool,
}

/// Producer-shared state: the live tail, the free-list head, the sender count.
#[repr(C)]
#[repr(align(64))]
struct ProducerSide<T> {
    last: AtomicPtr<Node<T>>,
    available: AtomicPtr<Node<T>>,
    count: AtomicIsize,
}

pub(crate) struct Bounded<T: Send> {
    consumer: ConsumerSide<T>,
    shared: SharedSide,
    producer: ProducerSide<T>,
}

// SAFETY: producer-side state is shared through atomics and gated by the
// permit semaphore; the consumer-side head and retired pointers are only
// accessed through the single receiver handle (which is not Sync).
unsafe impl<T: Send> Send for Bounded<T> {}
unsafe impl<T: Send> Sync for Bounded<T> {}

impl<T: Send> Bounded<T> {
    pub(crate) fn new(capacity: u32) -> Self {
        let dummy = Node::alloc(None);

        // Free list of capacity + 1 nodes; the final one doubles as the
        // consumer's initial retired slot, which permits keep reserved.
        let head = Node::alloc(None);
        let mut tail = head;
        for _ in 0..capacity {
            let node = Node::alloc(None);
            // SAFETY: nodes are private until the transport is shared.
            unsafe { (*tail).next.store(node, Ordering::Relaxed) };
            tail = node;
        }

        Self {
            consumer: ConsumerSide {
                first: UnsafeCell::new(dummy),
                retired: UnsafeCell::new(tail),
            },
            shared: SharedSide {
                permits: Semaphore::new(capacity),
                ready: Event::new(false),
                open: AtomicBool::new(true),
            },
            producer: ProducerSide {
                last: AtomicPtr::new(dummy),
                available: AtomicPtr::new(head),
                count: AtomicIsize::new(1),
            },
        }
    }

    pub(crate) fn send(&self, value: T) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }
        self.shared.permits.acquire();
        self.push_or_bounce(value)
    }

    pub(crate) fn try_send(&self, value: T) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }
        if !self.shared.permits.try_acquire() {
            return SendResult::fail(Status::WouldBlock, value);
        }
        self.push_or_bounce(value)
    }

    pub(crate) fn try_send_until(&self, value: T, deadline: Instant) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }
        if !self.shared.permits.try_acquire_until(deadline) {
            return SendResult::fail(Status::Timeout, value);
        }
        self.push_or_bounce(value)
    }

    pub(crate) fn receive(&self) -> RecvResult<T> {
        while self.peek().is_null() {
            self.shared.ready.wait();
        }
        self.pop()
    }

    pub(crate) fn try_receive(&self) -> RecvResult<T> {
        if self.peek().is_null() {
            return RecvResult::fail(Status::WouldBlock);
        }
        self.pop()
    }

    pub(crate) fn try_receive_until(&self, deadline: Instant) -> RecvResult<T> {
        while self.peek().is_null() {
            if !self.shared.ready.wait_until(deadline) {
                return RecvResult::fail(Status::Timeout);
            }
        }
        self.pop()
    }

    pub(crate) fn connect(&self) {
        self.producer.count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn disconnect(&self) {
        if self.producer.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!("last sender gone, publishing end marker");
            // Reuse a pooled node when one is free; otherwise allocate,
            // because announcing the end must never block.
            let marker = if self.shared.permits.try_acquire() {
                // SAFETY: this is the last sender, so the free list has no
                // other producer racing the pop; a plain store suffices.
                unsafe {
                    let node = self.producer.available.load(Ordering::Relaxed);
                    self.producer
                        .available
                        .store((*node).next.load(Ordering::Acquire), Ordering::Relaxed);
                    (*node).value = None;
                    (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
                    node
                }
            } else {
                Node::alloc(None)
            };
            let last = self.producer.last.load(Ordering::Relaxed);
            // SAFETY: no senders remain; `last` is stable and its `next` slot
            // is unclaimed. The tail is never advanced past the marker.
            unsafe { (*last).next.store(marker, Ordering::Release) };
            self.shared.ready.signal();
        }
    }

    pub(crate) fn close(&self) {
        self.shared.open.store(false, Ordering::Release);
        // Unblock one parked producer; it re-checks the flag and passes the
        // permit along, cascading the wake to the rest.
        self.shared.permits.release(1);
    }

    /// Enqueues `value` with a permit already held, unless the channel
    /// closed while this producer was blocked on the permit.
    fn push_or_bounce(&self, value: T) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            self.shared.permits.release(1);
            return SendResult::fail(Status::Closed, value);
        }

        // Pop a pooled node off the free list.
        let mut node = self.producer.available.load(Ordering::Relaxed);
        loop {
            // SAFETY: the held permit guarantees the free list is never
            // exhausted below the reserved retired node, so `node` is live.
            let next = unsafe { (*node).next.load(Ordering::Acquire) };
            match self.producer.available.compare_exchange(
                node,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => node = observed,
            }
        }

        // SAFETY: the CAS above took the node out of the free list; no other
        // producer can see it, and the consumer will not until it is linked.
        unsafe {
            (*node).value = Some(value);
            (*node).next.store(ptr::null_mut(), Ordering::Relaxed);
        }

        // Same swing-then-link as the unbounded queue.
        let mut last = self.producer.last.load(Ordering::Relaxed);
        loop {
            match self.producer.last.compare_exchange_weak(
                last,
                node,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => last = observed,
            }
        }
        // SAFETY: as in the unbounded queue, `last` stays alive until this
        // store publishes its successor.
        unsafe { (*last).next.store(node, Ordering::Release) };

        self.shared.ready.signal();
        SendResult::ok()
    }

    fn peek(&self) -> *mut Node<T> {
        // SAFETY: single consumer; the head is live until this side frees it.
        unsafe { (*(*self.consumer.first.get())).next.load(Ordering::Acquire) }
    }

    fn pop(&self) -> RecvResult<T> {
        // SAFETY: single consumer, and `peek` observed the next node with
        // acquire ordering, so its payload write is visible.
        unsafe {
            let first = *self.consumer.first.get();
            let next = (*first).next.load(Ordering::Relaxed);
            match (*next).value.take() {
                Some(value) => {
                    *self.consumer.first.get() = next;

                    // Recycle the old dummy onto the free-list tail and hand
                    // its capacity back to the producers.
                    (*first).next.store(ptr::null_mut(), Ordering::Relaxed);
                    let retired = *self.consumer.retired.get();
                    (*retired).next.store(first, Ordering::Release);
                    *self.consumer.retired.get() = first;
                    self.shared.permits.release(1);

                    RecvResult::ok(value)
                }
                // No payload means the end marker. It is left at the head so
                // every later receive re-observes it without blocking.
                None => RecvResult::fail(Status::Closed),
            }
        }
    }
}

impl<T: Send> Drop for Bounded<T> {
    fn drop(&mut self) {
        // SAFETY: both handles are gone. Every node lives on exactly one of
        // the two lists: walk the live list from the head and the free list
        // from `available`, freeing both.
        unsafe {
            let mut node = *self.consumer.first.get();
            while !node.is_null() {
                let next = (*node).next.load(Ordering::Relaxed);
                drop(Box::from_raw(node));
                node = next;
            }
            let mut node = self.producer.available.load(Ordering::Relaxed);
            while !node.is_null() {
                let next = (*node).next.load(Ordering::Relaxed);
                drop(Box::from_raw(node));
                node = next;
            }
        }
    }
}
