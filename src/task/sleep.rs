// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Cooperative delay: yields control repeatedly until `now >= start + s`.
/// A non-positive `seconds` resolves on its first poll.
///
/// Unlike [`crate::timeout`], `sleep` produces no [`crate::task::YieldKind`]
/// — per the data model, an ordinary yield the scheduler doesn't interpret
/// is "(c) any other value", realized here as a plain `Poll::Pending` with
/// nothing stashed for the scheduler to register.
#[must_use = "futures do nothing unless polled by a Scheduler"]
pub fn sleep(seconds: f64) -> Sleep {
    let deadline = if seconds > 0.0 {
        Some(Instant::now() + Duration::from_secs_f64(seconds))
    } else {
        None
    };
    Sleep { deadline }
}

#[derive(Debug)]
pub struct Sleep {
    deadline: Option<Instant>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.deadline {
            None => Poll::Ready(()),
            Some(deadline) if Instant::now() >= deadline => Poll::Ready(()),
            Some(_) => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::drive_to_completion;

    #[test]
    fn non_positive_duration_resolves_immediately() {
        let start = Instant::now();
        drive_to_completion(Box::pin(sleep(0.0)));
        drive_to_completion(Box::pin(sleep(-1.0)));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn sleep_waits_at_least_the_requested_duration() {
        let start = Instant::now();
        drive_to_completion(Box::pin(sleep(0.03)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
