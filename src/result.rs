// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// Adapted from the teacher crate's `sync::oneshot` channel: same idea (a
// shared inner cell plus a "has anyone already taken the value" guard), but
// since this runtime is single-threaded there is no need for `Arc` and
// atomics — a plain `Rc<RefCell<_>>` does the job and is what invariant 5.1
// ("no locking is needed") asks for.

use crate::error::Error;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) struct Slot<T> {
    value: RefCell<Option<Result<T, Error>>>,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Slot {
            value: RefCell::new(None),
        })
    }

    pub(crate) fn fill(&self, result: Result<T, Error>) {
        *self.value.borrow_mut() = Some(result);
    }

    fn take(&self) -> Option<Result<T, Error>> {
        self.value.borrow_mut().take()
    }

    fn is_filled(&self) -> bool {
        self.value.borrow().is_some()
    }
}

/// Adapts a completed task's return value or error into an unwrap-style
/// surface.
///
/// A `ResultHandle` reads its slot exactly once: the first of `unwrap`,
/// `unwrap_or`, `unwrap_or_else`, `expect`, or `into_result` to run consumes
/// it, and any later call observes [`Error::runtime`]'s "already taken"
/// message rather than panicking twice for the same failure.
pub struct ResultHandle<T> {
    slot: Rc<Slot<T>>,
}

impl<T> ResultHandle<T> {
    pub(crate) fn new(slot: Rc<Slot<T>>) -> Self {
        ResultHandle { slot }
    }

    /// `true` once the task this handle is waiting on has terminated and its
    /// result has been delivered (whether success or failure).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.is_filled()
    }

    /// Take the result, consuming it. Returns [`Error::runtime`] on a second
    /// call.
    pub fn into_result(self) -> Result<T, Error> {
        self.slot
            .take()
            .unwrap_or_else(|| Err(Error::runtime("result already taken from this ResultHandle")))
    }

    /// Unwrap the value, panicking with the task's error on failure.
    ///
    /// # Panics
    ///
    /// Panics if the task failed or timed out.
    pub fn unwrap(self) -> T {
        match self.into_result() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    /// Return the value, or `default` if the task failed.
    pub fn unwrap_or(self, default: T) -> T {
        self.into_result().unwrap_or(default)
    }

    /// Return the value, or compute a fallback from the error.
    pub fn unwrap_or_else(self, f: impl FnOnce(Error) -> T) -> T {
        self.into_result().unwrap_or_else(f)
    }

    /// Unwrap the value, panicking with `message` and the original cause on
    /// failure.
    ///
    /// # Panics
    ///
    /// Panics if the task failed or timed out.
    pub fn expect(self, message: &str) -> T {
        match self.into_result() {
            Ok(v) => v,
            Err(cause) => panic!("{}", Error::wrap(message, cause)),
        }
    }
}

impl<T> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}
