//! Multi-producer, single-consumer channels for cross-thread message passing.
//!
//! A channel is created by [`channel`] with a capacity that selects the
//! transport discipline:
//!
//! - [`UNBOUNDED`] - a fully asynchronous channel. Sends never block, but the
//!   queue may grow arbitrarily large if the receiver cannot keep up.
//! - `0` - a fully synchronous channel. Every send blocks in order to
//!   "rendezvous" with a receive.
//! - `> 0` - mixed synchronicity. Sends block *iff* there are already
//!   `capacity` items in the queue.
//! - Anything else - [`InvalidCapacity`].
//!
//! All three disciplines share the same [`Sender`]/[`Receiver`] API.
//! Senders are clonable; the receiver is unique. Dropping the last sender
//! lets the receiver drain the queue and then observe [`Status::Closed`];
//! dropping the receiver makes every subsequent send fail with
//! [`Status::Closed`], handing the item back.
//!
//! Runtime failures are reported as a [`Status`] in the returned result
//! struct, never as a panic: these primitives stay usable at arbitrary stack
//! depths and inside destructors.
//!
//! # Example
//!
//! ```
//! use strait::mpsc::{self, Status};
//!
//! let (tx, rx) = mpsc::channel::<String>(mpsc::UNBOUNDED).unwrap();
//!
//! tx.send("hello".to_string());
//! assert_eq!(rx.receive().value.as_deref(), Some("hello"));
//!
//! drop(tx);
//! assert_eq!(rx.receive().status, Status::Closed);
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use crate::trace::debug;

mod bounded;
mod rendezvous;
mod transport;
mod unbounded;

use transport::Transport;

/// Capacity sentinel selecting the unbounded transport.
pub const UNBOUNDED: isize = -1;

/// The capacity passed to [`channel`] was neither [`UNBOUNDED`], zero, nor a
/// representable positive count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid channel capacity: {0}")]
pub struct InvalidCapacity(pub isize);

/// Outcome of a channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation completed.
    Ok,
    /// A `try_` variant found the operation impossible without blocking.
    WouldBlock,
    /// A timed variant reached its deadline.
    Timeout,
    /// The other side of the channel has been torn down.
    Closed,
}

/// Whether a handle's operations can block on a correctly-sized queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    Never,
    Sometimes,
    Always,
}

/// Result of a send. On failure [`item`](Self::item) carries the unsent value
/// back so the caller can route it elsewhere.
#[derive(Debug)]
pub struct SendResult<T> {
    pub status: Status,
    pub item: Option<T>,
}

impl<T> SendResult<T> {
    pub(crate) fn ok() -> Self {
        Self {
            status: Status::Ok,
            item: None,
        }
    }

    pub(crate) fn fail(status: Status, item: T) -> Self {
        Self {
            status,
            item: Some(item),
        }
    }

    /// `true` iff the item was handed to the channel.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Recovers the unsent item, if any.
    pub fn into_item(self) -> Option<T> {
        self.item
    }
}

/// Result of a receive. [`value`](Self::value) is populated exactly when the
/// status is [`Status::Ok`].
#[derive(Debug)]
pub struct RecvResult<T> {
    pub status: Status,
    pub value: Option<T>,
}

impl<T> RecvResult<T> {
    pub(crate) fn ok(value: T) -> Self {
        Self {
            status: Status::Ok,
            value: Some(value),
        }
    }

    pub(crate) fn fail(status: Status) -> Self {
        Self {
            status,
            value: None,
        }
    }

    /// `true` iff a value was received.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// The received value, if any.
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

/// Creates a multi-producer, single-consumer FIFO for cross-thread message
/// passing.
///
/// See the [module docs](self) for how `capacity` selects the transport.
///
/// # Errors
///
/// Returns [`InvalidCapacity`] for a negative capacity other than
/// [`UNBOUNDED`], or a positive one exceeding the transport's permit counter.
pub fn channel<T: Send>(capacity: isize) -> Result<(Sender<T>, Receiver<T>), InvalidCapacity> {
    let transport = match capacity {
        UNBOUNDED => Transport::Unbounded(unbounded::Unbounded::new()),
        0 => Transport::Rendezvous(rendezvous::Rendezvous::new()),
        c if c > 0 => {
            let capacity = u32::try_from(c).map_err(|_| InvalidCapacity(c))?;
            Transport::Bounded(bounded::Bounded::new(capacity))
        }
        c => return Err(InvalidCapacity(c)),
    };
    debug!(capacity, "channel created");

    let shared = Arc::new(transport);
    let sender = Sender {
        transport: Arc::clone(&shared),
    };
    let receiver = Receiver {
        transport: shared,
        _unsync: PhantomData,
    };
    Ok((sender, receiver))
}

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Producer half of a channel.
///
/// Clonable; the transport tracks the number of live senders and the receiver
/// observes [`Status::Closed`] once the last one is gone and the queue is
/// drained.
pub struct Sender<T: Send> {
    transport: Arc<Transport<T>>,
}

impl<T: Send> std::fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

impl<T: Send> Sender<T> {
    /// Hands `value` to the channel, blocking as the transport demands.
    pub fn send(&self, value: T) -> SendResult<T> {
        self.transport.send(value)
    }

    /// As [`send`](Self::send), but never blocks.
    pub fn try_send(&self, value: T) -> SendResult<T> {
        self.transport.try_send(value)
    }

    /// As [`send`](Self::send), but gives up at `deadline`.
    pub fn try_send_until(&self, value: T, deadline: Instant) -> SendResult<T> {
        self.transport.try_send_until(value, deadline)
    }

    /// As [`send`](Self::send), but gives up after `timeout`.
    pub fn try_send_for(&self, value: T, timeout: Duration) -> SendResult<T> {
        self.transport.try_send_until(value, Instant::now() + timeout)
    }

    /// Whether sends on this channel can block.
    #[must_use]
    pub fn blocks(&self) -> Blocking {
        self.transport.send_blocks()
    }
}

impl<T: Send> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.transport.connect();
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Send> Drop for Sender<T> {
    fn drop(&mut self) {
        self.transport.disconnect();
    }
}

/// Consumer half of a channel.
///
/// # Thread Safety
///
/// `Receiver` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Receiver` (no concurrent `receive()`)
pub struct Receiver<T: Send> {
    transport: Arc<Transport<T>>,
    _unsync: PhantomUnsync,
}

impl<T: Send> std::fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl<T: Send> Receiver<T> {
    /// Takes the next value, blocking until one arrives or the last sender
    /// disconnects.
    #[must_use]
    pub fn receive(&self) -> RecvResult<T> {
        self.transport.receive()
    }

    /// As [`receive`](Self::receive), but never blocks.
    #[must_use]
    pub fn try_receive(&self) -> RecvResult<T> {
        self.transport.try_receive()
    }

    /// As [`receive`](Self::receive), but gives up at `deadline`.
    #[must_use]
    pub fn try_receive_until(&self, deadline: Instant) -> RecvResult<T> {
        self.transport.try_receive_until(deadline)
    }

    /// As [`receive`](Self::receive), but gives up after `timeout`.
    #[must_use]
    pub fn try_receive_for(&self, timeout: Duration) -> RecvResult<T> {
        self.transport.try_receive_until(Instant::now() + timeout)
    }

    /// Whether receives on this channel can block.
    #[must_use]
    pub fn blocks(&self) -> Blocking {
        self.transport.recv_blocks()
    }

    /// Iterates over incoming values until the channel is closed.
    ///
    /// Each call to `next` blocks like [`receive`](Self::receive).
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { receiver: self }
    }
}

impl<T: Send> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// Blocking iterator over received values. See [`Receiver::iter`].
pub struct Iter<'a, T: Send> {
    receiver: &'a Receiver<T>,
}

impl<T: Send> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.receive().into_value()
    }
}

impl<'a, T: Send> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Owning blocking iterator; closes the channel when dropped.
pub struct IntoIter<T: Send> {
    receiver: Receiver<T>,
}

impl<T: Send> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.receive().into_value()
    }
}

impl<T: Send> IntoIterator for Receiver<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { receiver: self }
    }
}
