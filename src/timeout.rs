// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::{Duration, Instant};

/// A deadline a task has requested the scheduler track.
///
/// `Timeout` is immutable after construction: the deadline is fixed the
/// instant [`Timeout::new`] runs, not when the scheduler gets around to
/// registering it. A zero or negative `duration` means "never expires".
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    deadline: Option<Instant>,
    duration: Duration,
}

impl Timeout {
    /// Construct a timeout that expires `duration` from now.
    ///
    /// A `duration` of zero never expires, matching the source behavior
    /// where a non-positive configured duration disables the timeout.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        let deadline = if duration.is_zero() {
            None
        } else {
            Some(Instant::now() + duration)
        };
        Timeout { deadline, duration }
    }

    /// Construct a timeout from a fractional-seconds count, matching the
    /// public `timeout(seconds)` surface from the core API. Negative values
    /// are treated the same as zero.
    #[must_use]
    pub fn from_secs_f64(seconds: f64) -> Self {
        let duration = if seconds > 0.0 {
            Duration::from_secs_f64(seconds)
        } else {
            Duration::ZERO
        };
        Self::new(duration)
    }

    /// `true` once `now >= deadline`. Always `false` for a never-expiring
    /// timeout.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The duration this timeout was constructed with.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}
