// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::Duration;

/// The runtime's error taxonomy.
///
/// A task that fails does so with one of these four variants; see the
/// propagation policy for where each one ends up (surfaced through
/// [`crate::ResultHandle`], logged-and-dropped, or silently dropped).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller passed a nonsensical argument: a negative pacing limit, a
    /// factory that didn't produce a resumable computation, an unsupported
    /// protocol for [`crate::Socket`], and so on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A task's [`crate::Timeout`] expired before it terminated.
    #[error("task timed out after {:.3}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// A task failed for any other reason, wrapping the underlying cause.
    #[error("{message}")]
    Runtime {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    /// The memory watchdog tripped and the run loop had to stop early.
    #[error("memory watchdog exceeded its soft limit")]
    ResourceExhausted,
}

impl Error {
    /// Construct a plain [`Error::Runtime`] with no further cause.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap `cause` in a new [`Error::Runtime`], the way `expect` and `retry`
    /// do when they need to attach a message to an existing failure.
    pub fn wrap(message: impl Into<String>, cause: Error) -> Self {
        Error::Runtime {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }
}
