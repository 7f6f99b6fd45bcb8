//! Low-level concurrency primitives built on address waiting (futex and
//! equivalents), plus a multi-producer single-consumer channel family that
//! unifies unbounded, bounded, and rendezvous transports behind one
//! sender/receiver API.
//!
//! # Modules
//!
//! - [`sync`] - events, semaphores, mutexes, and latches parked directly on
//!   32-bit memory cells
//! - [`mpsc`] - the channel factory and the [`Sender`](mpsc::Sender) /
//!   [`Receiver`](mpsc::Receiver) handle pair
//!
//! # Example
//!
//! ```
//! use strait::mpsc;
//!
//! let (tx, rx) = mpsc::channel::<u64>(16).unwrap();
//!
//! std::thread::spawn(move || {
//!     for i in 0..4 {
//!         tx.send(i);
//!     }
//! });
//!
//! let received: Vec<u64> = rx.into_iter().collect();
//! assert_eq!(received, [0, 1, 2, 3]);
//! ```

pub mod mpsc;
pub mod sync;

mod trace;

pub use trace::init_tracing;

/// The steady clock used for every deadline in this crate.
pub use minstant::Instant;
