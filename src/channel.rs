// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// Grounded the same way as `result::Slot`: a shared `Rc<RefCell<_>>` stands
// in for the teacher's `Arc`+atomics, since the scheduler never runs two
// steps at once.

use crate::error::Error;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

thread_local! {
    static NEXT_CHANNEL_ID: Cell<u64> = const { Cell::new(0) };
}

/// Identifies a [`Channel`] independently of the values it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// A bounded, in-memory, FIFO channel (§6).
///
/// Cloning a `Channel` shares the same underlying queue — clone it once per
/// producer/consumer the way an `Rc` is shared, not once per message.
pub struct Channel<T> {
    id: ChannelId,
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl<T> Channel<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let id = NEXT_CHANNEL_ID.with(|c| {
            let id = c.get();
            c.set(id.wrapping_add(1));
            id
        });
        Channel {
            id: ChannelId(id),
            inner: Rc::new(RefCell::new(Inner {
                queue: VecDeque::new(),
                capacity: capacity.max(1),
                closed: false,
            })),
        }
    }

    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Mark the channel closed. Queued values are still delivered to
    /// pending/subsequent `recv`s; once drained, `recv` fails. `send` fails
    /// immediately from this point on.
    pub fn close(&self) {
        self.inner.borrow_mut().closed = true;
    }

    /// A resumable computation that yields (cooperatively retrying) while
    /// the channel is at capacity, then pushes `value` and returns.
    #[must_use = "futures do nothing unless polled by a Scheduler"]
    pub fn send(&self, value: T) -> Send<T> {
        Send {
            inner: self.inner.clone(),
            value: Some(value),
        }
    }

    /// The non-yielding, capacity-respecting variant of [`Channel::send`].
    pub fn try_send(&self, value: T) -> Result<(), Error> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(closed_error());
        }
        if inner.queue.len() >= inner.capacity {
            return Err(Error::runtime("channel full"));
        }
        inner.queue.push_back(value);
        Ok(())
    }

    /// A resumable computation that yields while the channel is empty, then
    /// pops the head value.
    #[must_use = "futures do nothing unless polled by a Scheduler"]
    pub fn recv(&self) -> Recv<T> {
        Recv {
            inner: self.inner.clone(),
        }
    }

    /// The non-yielding variant of [`Channel::recv`].
    pub fn try_recv(&self) -> Result<T, Error> {
        let mut inner = self.inner.borrow_mut();
        match inner.queue.pop_front() {
            Some(value) => Ok(value),
            None if inner.closed => Err(closed_error()),
            None => Err(Error::runtime("channel empty")),
        }
    }
}

fn closed_error() -> Error {
    Error::runtime("channel closed")
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("len", &inner.queue.len())
            .field("capacity", &inner.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[must_use = "futures do nothing unless polled by a Scheduler"]
pub struct Send<T> {
    inner: Rc<RefCell<Inner<T>>>,
    value: Option<T>,
}

impl<T> Unpin for Send<T> {}

impl<T> Future for Send<T> {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut inner = this.inner.borrow_mut();
        if inner.closed {
            return Poll::Ready(Err(closed_error()));
        }
        if inner.queue.len() < inner.capacity {
            let value = this
                .value
                .take()
                .expect("Send polled again after completion");
            inner.queue.push_back(value);
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }
}

#[must_use = "futures do nothing unless polled by a Scheduler"]
pub struct Recv<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Future for Recv<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        if let Some(value) = inner.queue.pop_front() {
            return Poll::Ready(Ok(value));
        }
        if inner.closed {
            return Poll::Ready(Err(closed_error()));
        }
        Poll::Pending
    }
}
