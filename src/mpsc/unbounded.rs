//! Unbounded linked-queue transport.
//!
//! # Algorithm
//!
//! A singly-linked FIFO that always keeps one "dummy" node at the head, so
//! producers never touch the consumer's head pointer. A producer swings the
//! shared tail to a freshly allocated node and then links it in through the
//! previous tail's `next`; the consumer reads from `head.next`, moves the
//! payload out, and advances. Sender disconnect is announced in-band: the
//! last sender links a node with no payload, which the consumer treats as
//! the end marker after draining everything before it.
//!
//! Sends never block; nodes are heap-allocated on send and freed on receive.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, Ordering};

use minstant::Instant;

use crate::mpsc::{RecvResult, SendResult, Status};
use crate::sync::event::Event;
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

/// Consumer-owned state: the dummy head.
#[repr(C)]
#[repr(align(64))] // own cache line to avoid false sharing with producers
struct ConsumerSide<T> {
    first: UnsafeCell<*mut Node<T>>,
}

/// State touched by both sides.
#[repr(C)]
#[repr(align(64))]
struct SharedSide {
    open: AtomicBool,
    ready: Event,
}

/// Producer-shared state: the tail and the live sender count.
#[repr(C)]
#[repr(align(64))]
struct ProducerSide<T> {
    last: AtomicPtr<Node<T>>,
    count: AtomicIsize,
}

pub(crate) struct Unbounded<T: Send> {
    consumer: ConsumerSide<T>,
    shared: SharedSide,
    producer: ProducerSide<T>,
}

// SAFETY: producer-side state is shared through atomics; the consumer-side
// head is only ever accessed through the single receiver handle (which is not
// Sync), so the UnsafeCell is never raced.
unsafe impl<T: Send> Send for Unbounded<T> {}
unsafe impl<T: Send> Sync for Unbounded<T> {}

impl<T: Send> Unbounded<T> {
    pub(crate) fn new() -> Self {
        let dummy = Node::alloc(None);
        Self {
            consumer: ConsumerSide {
                first: UnsafeCell::new(dummy),
            },
            shared: SharedSide {
                open: AtomicBool::new(true),
                ready: Event::new(false),
            },
            producer: ProducerSide {
                last: AtomicPtr::new(dummy),
                count: AtomicIsize::new(1),
            },
        }
    }

    pub(crate) fn send(&self, value: T) -> SendResult<T> {
        if !self.shared.open.load(Ordering::Acquire) {
            return SendResult::fail(Status::Closed, value);
        }

        let node = Node::alloc(Some(value));
        // Swinging the tail first grants this thread exclusive producer-side
        // access to the previous tail's `next` slot.
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
        // SAFETY: the consumer cannot free `last` until its `next` is
        // published, which is exactly this store.
        unsafe { (*last).next.store(node, Ordering::Release) };

        // The thread that swung the tail may not be the first to publish its
        // link, so the consumer can be woken before `head.next` is visible;
        // its wait loop absorbs that as a spurious wake.
        self.shared.ready.signal();
        SendResult::ok()
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
            let marker = Node::alloc(None);
            let last = self.producer.last.load(Ordering::Relaxed);
            // SAFETY: no senders remain, so `last` is stable and its `next`
            // slot is unclaimed. The tail is never advanced past the marker.
            unsafe { (*last).next.store(marker, Ordering::Release) };
            self.shared.ready.signal();
        }
    }

    pub(crate) fn close(&self) {
        self.shared.open.store(false, Ordering::Release);
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
                    drop(Box::from_raw(first));
                    RecvResult::ok(value)
                }
                // No payload means the end marker. It is left at the head so
                // every later receive re-observes it without blocking.
                None => RecvResult::fail(Status::Closed),
            }
        }
    }
}

impl<T: Send> Drop for Unbounded<T> {
    fn drop(&mut self) {
        // SAFETY: both handles are gone; walk and free the remaining list.
        unsafe {
            let mut node = *self.consumer.first.get();
            while !node.is_null() {
                let next = (*node).next.load(Ordering::Relaxed);
                drop(Box::from_raw(node));
                node = next;
            }
        }
    }
}
