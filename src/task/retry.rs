// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::Error;
use crate::task::sleep::sleep;
use std::future::Future;

/// Drive `factory()` as a sub-computation, retrying with exponential backoff
/// on failure.
///
/// On the `k`-th failed attempt (1-indexed), if `should_retry` is absent or
/// returns `true` for that attempt's error, waits `base_delay * backoff^(k-1)`
/// seconds before trying again. After `max_retries` failed attempts, fails
/// with [`Error::Runtime`] wrapping the last cause (L3).
pub async fn retry<F, Fut, T>(
    mut factory: F,
    max_retries: u32,
    base_delay: f64,
    backoff: f64,
    should_retry: Option<&dyn Fn(&Error) -> bool>,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match factory().await {
            Ok(value) => return Ok(value),
            Err(cause) => {
                let retryable = should_retry.is_none_or(|pred| pred(&cause));
                if !retryable || attempt >= max_retries {
                    return Err(Error::wrap(
                        format!("retry exhausted after {attempt} attempt(s)"),
                        cause,
                    ));
                }
                let delay = base_delay * backoff.powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Instant;

    #[test]
    fn retry_exhausts_after_max_attempts() {
        let scheduler = Scheduler::new();
        let attempts = Rc::new(Cell::new(0u32));
        let a = attempts.clone();

        let handle = scheduler.spawn(async move {
            retry(
                move || {
                    let a = a.clone();
                    async move {
                        a.set(a.get() + 1);
                        Err::<(), _>(Error::runtime("always fails"))
                    }
                },
                3,
                0.01,
                2.0,
                None,
            )
            .await
        });
        scheduler.run();
        assert!(handle.into_result().is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn retry_backs_off_exponentially() {
        let scheduler = Scheduler::new();
        let start = Instant::now();

        let handle = scheduler.spawn(async move {
            retry(
                move || async move { Err::<(), _>(Error::runtime("always fails")) },
                3,
                0.02,
                2.0,
                None,
            )
            .await
        });
        scheduler.run();
        assert!(handle.into_result().is_err());
        // delays: 0.02 then 0.04 => at least 0.06s total
        assert!(start.elapsed().as_secs_f64() >= 0.06);
    }

    #[test]
    fn should_retry_predicate_can_stop_early() {
        let scheduler = Scheduler::new();
        let attempts = Rc::new(Cell::new(0u32));
        let a = attempts.clone();

        let handle = scheduler.spawn(async move {
            retry(
                move || {
                    let a = a.clone();
                    async move {
                        a.set(a.get() + 1);
                        Err::<(), _>(Error::runtime("fatal"))
                    }
                },
                5,
                0.001,
                2.0,
                Some(&|_e: &Error| false),
            )
            .await
        });
        scheduler.run();
        assert!(handle.into_result().is_err());
        assert_eq!(attempts.get(), 1);
    }
}
