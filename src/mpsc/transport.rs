//! Dispatch over the three transport disciplines.
//!
//! The variants share nothing beyond the sender/receiver result types; each
//! implements the full capability set and this enum routes calls by tag.

use minstant::Instant;

use crate::mpsc::bounded::Bounded;
use crate::mpsc::rendezvous::Rendezvous;
use crate::mpsc::unbounded::Unbounded;
use crate::mpsc::{Blocking, RecvResult, SendResult};

pub(crate) enum Transport<T: Send> {
    Unbounded(Unbounded<T>),
    Bounded(Bounded<T>),
    Rendezvous(Rendezvous<T>),
}

impl<T: Send> Transport<T> {
    pub(crate) fn send(&self, value: T) -> SendResult<T> {
        match self {
            Self::Unbounded(ch) => ch.send(value),
            Self::Bounded(ch) => ch.send(value),
            Self::Rendezvous(ch) => ch.send(value),
        }
    }

    pub(crate) fn try_send(&self, value: T) -> SendResult<T> {
        match self {
            // Unbounded sends never block, so every try degenerates to send.
            Self::Unbounded(ch) => ch.send(value),
            Self::Bounded(ch) => ch.try_send(value),
            Self::Rendezvous(ch) => ch.try_send(value),
        }
    }

    pub(crate) fn try_send_until(&self, value: T, deadline: Instant) -> SendResult<T> {
        match self {
            Self::Unbounded(ch) => ch.send(value),
            Self::Bounded(ch) => ch.try_send_until(value, deadline),
            Self::Rendezvous(ch) => ch.try_send_until(value, deadline),
        }
    }

    pub(crate) fn send_blocks(&self) -> Blocking {
        match self {
            Self::Unbounded(_) => Blocking::Never,
            Self::Bounded(_) => Blocking::Sometimes,
            Self::Rendezvous(_) => Blocking::Always,
        }
    }

    pub(crate) fn connect(&self) {
        match self {
            Self::Unbounded(ch) => ch.connect(),
            Self::Bounded(ch) => ch.connect(),
            Self::Rendezvous(ch) => ch.connect(),
        }
    }

    pub(crate) fn disconnect(&self) {
        match self {
            Self::Unbounded(ch) => ch.disconnect(),
            Self::Bounded(ch) => ch.disconnect(),
            Self::Rendezvous(ch) => ch.disconnect(),
        }
    }

    pub(crate) fn receive(&self) -> RecvResult<T> {
        match self {
            Self::Unbounded(ch) => ch.receive(),
            Self::Bounded(ch) => ch.receive(),
            Self::Rendezvous(ch) => ch.receive(),
        }
    }

    pub(crate) fn try_receive(&self) -> RecvResult<T> {
        match self {
            Self::Unbounded(ch) => ch.try_receive(),
            Self::Bounded(ch) => ch.try_receive(),
            Self::Rendezvous(ch) => ch.try_receive(),
        }
    }

    pub(crate) fn try_receive_until(&self, deadline: Instant) -> RecvResult<T> {
        match self {
            Self::Unbounded(ch) => ch.try_receive_until(deadline),
            Self::Bounded(ch) => ch.try_receive_until(deadline),
            Self::Rendezvous(ch) => ch.try_receive_until(deadline),
        }
    }

    pub(crate) fn recv_blocks(&self) -> Blocking {
        match self {
            Self::Unbounded(_) | Self::Bounded(_) => Blocking::Sometimes,
            Self::Rendezvous(_) => Blocking::Always,
        }
    }

    pub(crate) fn close(&self) {
        match self {
            Self::Unbounded(ch) => ch.close(),
            Self::Bounded(ch) => ch.close(),
            Self::Rendezvous(ch) => ch.close(),
        }
    }
}
