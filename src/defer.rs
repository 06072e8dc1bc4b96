// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::future::Future;
use std::pin::Pin;

type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;

enum Action {
    Sync(Box<dyn FnOnce()>),
    Async(Box<dyn FnOnce() -> BoxFuture>),
}

/// A cleanup closure registered to run once when its owning task terminates,
/// however that termination happens (return, failure, or timeout).
///
/// Arguments are bound simply by capturing them in the closure passed to
/// [`Defer::new`] or [`Defer::new_async`] — Rust closures already do the
/// "closure + bound arguments" packaging the source's `Defer` spells out
/// explicitly.
pub struct Defer {
    action: Action,
}

impl Defer {
    /// Defer a plain closure.
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Defer {
            action: Action::Sync(Box::new(action)),
        }
    }

    /// Defer a closure that itself returns a resumable computation.
    ///
    /// Per the cleanup protocol, the returned future is driven synchronously
    /// to completion by the scheduler — it may not suspend the outer
    /// cleanup, so any of its own yields are simply polled past, not
    /// interleaved with other tasks.
    pub fn new_async<F>(action: impl FnOnce() -> F + 'static) -> Self
    where
        F: Future<Output = ()> + 'static,
    {
        Defer {
            action: Action::Async(Box::new(move || Box::pin(action()))),
        }
    }

    /// Consume this `Defer`, returning a future that completes once the
    /// cleanup closure (and, if it produced one, its sub-computation) has
    /// run. The scheduler drives this to completion inline, never yielding
    /// it back into the task queue.
    pub(crate) fn into_future(self) -> BoxFuture {
        match self.action {
            Action::Sync(f) => {
                f();
                Box::pin(std::future::ready(()))
            }
            Action::Async(f) => f(),
        }
    }
}

impl std::fmt::Debug for Defer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Defer").finish_non_exhaustive()
    }
}
