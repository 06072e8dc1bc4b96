// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

pub mod retry;
pub mod sleep;

use crate::defer::Defer;
use crate::error::Error;
use crate::id::TaskId;
use crate::timeout::Timeout;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Instant;

/// A task's step function, fully type-erased: the typed return value has
/// already been routed to its [`crate::ResultHandle`] by the time this
/// future resolves, so all the scheduler needs to know is whether the task
/// succeeded.
pub(crate) type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<(), Error>>>>;

/// The value a task yields between steps (§3 of the data model).
///
/// There is no `Other` variant: an ordinary `.await` on some future that
/// isn't [`timeout`] or [`defer`] produces no `YieldKind` at all, which is
/// this rewrite's encoding of "(c) any other value — treated as an opaque
/// 'I'm alive, resume me later' signal". See the design notes on
/// duck-typed yield dispatch.
#[derive(Debug)]
pub(crate) enum YieldKind {
    Timeout(Timeout),
    Defer(Defer),
}

/// Per-task state visible to code running inside the task body: which task
/// this is, where to stash the next `YieldKind`, and whether cancellation
/// has been requested.
struct TaskCx {
    id: TaskId,
    cancel: Rc<Cell<bool>>,
    yielded: RefCell<Option<YieldKind>>,
}

thread_local! {
    // A stack, not a single slot, because `run()` can re-enter itself from
    // inside a deferred action; pushing/popping preserves the innermost
    // task's context across that nesting.
    static CURRENT: RefCell<Vec<Rc<TaskCx>>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct CurrentTaskGuard;

impl Drop for CurrentTaskGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| {
            c.borrow_mut().pop();
        });
    }
}

pub(crate) fn enter(id: TaskId, cancel: Rc<Cell<bool>>) -> CurrentTaskGuard {
    let cx = Rc::new(TaskCx {
        id,
        cancel,
        yielded: RefCell::new(None),
    });
    CURRENT.with(|c| c.borrow_mut().push(cx));
    CurrentTaskGuard
}

/// Take whatever the task stepping right now yielded, if anything. Called by
/// the scheduler immediately after polling a task.
pub(crate) fn take_yielded() -> Option<YieldKind> {
    CURRENT.with(|c| {
        c.borrow()
            .last()
            .and_then(|cx| cx.yielded.borrow_mut().take())
    })
}

pub(crate) fn current_id() -> Option<TaskId> {
    CURRENT.with(|c| c.borrow().last().map(|cx| cx.id))
}

/// `true` if the task currently stepping has been asked to cancel (a losing
/// `select` branch, per the cancellation redesign in §9/§10).
#[must_use]
pub fn is_cancelled() -> bool {
    CURRENT.with(|c| {
        c.borrow()
            .last()
            .is_some_and(|cx| cx.cancel.get())
    })
}

/// A future that, on its first poll, stashes `kind` for the scheduler to
/// register and suspends the task for exactly one step; on the next poll it
/// resolves. This is the single mechanism `timeout()` and `defer()` use to
/// "yield a value" the way the source's generators do.
///
/// Resolves immediately instead of suspending when polled outside a task
/// body (no current [`TaskCx`]) — this future never registers a waker, so
/// suspending there under an executor that actually parks on `Pending`
/// would hang forever waiting for a wake-up nobody will ever send.
struct Yielded {
    kind: Option<YieldKind>,
}

impl Future for Yielded {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // Outside a task body there is no `TaskCx` to hand the `YieldKind`
        // to and, since this future never registers a waker, suspending
        // here would hang forever under any executor but corun's own
        // eagerly-redriving `Scheduler`. Resolve immediately instead, which
        // is what `timeout`/`defer`/`defer_async`'s docs promise for that
        // case.
        if current_id().is_none() {
            return Poll::Ready(());
        }
        match this.kind.take() {
            Some(kind) => {
                CURRENT.with(|c| {
                    if let Some(cx) = c.borrow().last() {
                        *cx.yielded.borrow_mut() = Some(kind);
                    }
                });
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

/// Request that the scheduler track a deadline for the currently running
/// task, failing it with [`Error::Timeout`] if it is still alive when the
/// deadline passes. A non-positive `seconds` means "never expires".
///
/// Must be called from inside a task body (i.e. while it is being polled by
/// a [`crate::Scheduler`]); calling it elsewhere is a no-op since there is no
/// current task to register the timeout against.
pub async fn timeout(seconds: f64) {
    Yielded {
        kind: Some(YieldKind::Timeout(Timeout::from_secs_f64(seconds))),
    }
    .await;
}

/// Register a cleanup closure that runs exactly once when the currently
/// running task terminates, however it terminates.
pub async fn defer(action: impl FnOnce() + 'static) {
    Yielded {
        kind: Some(YieldKind::Defer(Defer::new(action))),
    }
    .await;
}

/// Like [`defer`], but the closure itself returns a resumable computation
/// that the scheduler drives synchronously to completion during cleanup.
pub async fn defer_async<F>(action: impl FnOnce() -> F + 'static)
where
    F: Future<Output = ()> + 'static,
{
    Yielded {
        kind: Some(YieldKind::Defer(Defer::new_async(action))),
    }
    .await;
}

/// A live task record (§3: identity, step function, await-flag,
/// running-flag, birth timestamp).
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) future: BoxTaskFuture,
    pub(crate) awaited: bool,
    pub(crate) running: Cell<bool>,
    pub(crate) birth: Instant,
    pub(crate) cancel: Rc<Cell<bool>>,
    /// Routes a timeout failure into this task's `Slot<T>` without the
    /// scheduler needing to know `T`. Consumed at most once, when a step
    /// finds the task still `Pending` past its deadline; otherwise dropped
    /// unused once the task completes on its own.
    pub(crate) fail_slot: Cell<Option<Box<dyn FnOnce(Error)>>>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        future: BoxTaskFuture,
        awaited: bool,
        fail_slot: Box<dyn FnOnce(Error)>,
    ) -> Self {
        Task {
            id,
            future,
            awaited,
            running: Cell::new(false),
            birth: Instant::now(),
            cancel: Rc::new(Cell::new(false)),
            fail_slot: Cell::new(Some(fail_slot)),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("awaited", &self.awaited)
            .field("running", &self.running.get())
            .field("age", &self.birth.elapsed())
            .finish_non_exhaustive()
    }
}

/// Build the type-erased future that wraps a user task body, routing its
/// typed result into `slot` before reporting bare success/failure to the
/// scheduler.
pub(crate) fn wrap<F, T>(fut: F, slot: Rc<crate::result::Slot<T>>) -> BoxTaskFuture
where
    F: Future<Output = Result<T, Error>> + 'static,
    T: 'static,
{
    Box::pin(async move {
        match fut.await {
            Ok(value) => {
                slot.fill(Ok(value));
                Ok(())
            }
            Err(err) => {
                let failed = Error::runtime(format!("task failed: {err}"));
                slot.fill(Err(err));
                Err(failed)
            }
        }
    })
}

/// Build the closure that routes a timeout (or other scheduler-detected
/// failure) into `slot`, type-erased the same way [`wrap`]'s future is.
pub(crate) fn fail_slot<T: 'static>(slot: Rc<crate::result::Slot<T>>) -> Box<dyn FnOnce(Error)> {
    Box::new(move |err| slot.fill(Err(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::drive_to_completion;

    #[test]
    fn timeout_outside_a_task_body_resolves_immediately_instead_of_hanging() {
        // No `TaskCx` is pushed here, so this isn't running inside a
        // `Scheduler::step`. Drive it with the crate's own no-waker poll
        // loop, which never parks — if `Yielded` ever suspended here it
        // would spin forever, so completing this test at all is the
        // assertion.
        drive_to_completion(Box::pin(timeout(60.0)));
    }

    #[test]
    fn defer_outside_a_task_body_resolves_immediately_instead_of_hanging() {
        drive_to_completion(Box::pin(defer(|| {})));
    }
}
