// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::task::{RawWaker, RawWakerVTable, Waker};

// The run loop never waits to be woken: it redrives every queued task once
// per tick regardless (§10, "resumable computations"). A task's `Waker` is
// therefore purely decorative — `wake` has nothing to notify — so a single
// no-op vtable shared by every poll is all that's needed.
static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake, drop);

fn clone(_: *const ()) -> RawWaker {
    raw()
}

fn wake(_: *const ()) {}

fn drop(_: *const ()) {}

fn raw() -> RawWaker {
    RawWaker::new(std::ptr::null(), &VTABLE)
}

pub(crate) fn noop_waker() -> Waker {
    // Safety: the vtable's functions are all no-ops and never dereference
    // the data pointer, so a null pointer is sound to hand out.
    unsafe { Waker::from_raw(raw()) }
}
