// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single-threaded cooperative task scheduler.
//!
//! `corun` multiplexes many long-running logical tasks onto one execution
//! thread using ordinary Rust `Future`s, polled by a busy, no-waker run loop
//! rather than an OS/IO reactor. It gives a synchronous host program
//! `spawn`/`join`/`select`/`await` semantics, non-blocking sleeps,
//! cancellable timeouts, scope-bound deferred cleanups, periodic repeaters,
//! bounded in-memory channels, and a lazy byte-stream reader — without
//! pulling in a multi-threaded, work-stealing executor.
//!
//! There is no preemption, no parallelism, and no OS-integrated I/O: a task
//! that never yields monopolizes the scheduler, and a blocking syscall in a
//! task body blocks the whole runtime. See [`Scheduler`] for the run loop
//! this crate is built around.

pub mod channel;
mod defer;
pub mod error;
mod id;
mod repeater;
mod result;
pub mod scheduler;
pub mod socket;
pub mod stream;
mod timeout;
pub mod task;
mod watchdog;

pub use channel::{Channel, ChannelId};
pub use defer::Defer;
pub use error::Error;
pub use id::TaskId;
pub use repeater::RepeaterHandle;
pub use result::ResultHandle;
pub use scheduler::{await_task, cleanup, join, repeat, run, select, spawn, Scheduler, SchedulerConfig};
pub use socket::{Protocol, Socket};
pub use stream::ByteStream;
pub use task::{defer as defer_cleanup, defer_async, is_cancelled, timeout as timeout_after};
pub use timeout::Timeout;
pub use watchdog::{MemoryWatchdog, WatchdogConfig};

pub use task::retry::retry;
pub use task::sleep::sleep;
