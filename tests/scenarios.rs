// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// End-to-end scenarios S1-S6.

use corun::{retry, sleep, Error, Scheduler, SchedulerConfig};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// S1: awaiting a task returns its value to the caller.
#[test]
fn s1_await_returns_value() {
    init_tracing();
    let scheduler = Scheduler::new();
    let handle = scheduler.await_task(async { Ok::<_, Error>(1 + 1) });
    assert_eq!(handle.unwrap(), 2);
}

/// S2: `join` interleaves two concurrently-spawned sleepers, each resuming
/// independently rather than blocking behind the other.
#[test]
fn s2_join_interleaves_two_sleepers() {
    init_tracing();
    let scheduler = Scheduler::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let (a, b) = (order.clone(), order.clone());

    let handles = scheduler.join(vec![
        Box::pin(async move {
            sleep(0.02).await;
            a.borrow_mut().push("slow");
            Ok::<_, Error>(())
        }) as Pin<Box<dyn Future<Output = Result<(), Error>>>>,
        Box::pin(async move {
            b.borrow_mut().push("fast");
            Ok::<_, Error>(())
        }),
    ]);

    for handle in handles {
        handle.unwrap();
    }
    assert_eq!(*order.borrow(), vec!["fast", "slow"]);
}

/// S3: `select` returns as soon as the first branch finishes; the other
/// branch is left queued rather than torn down.
#[test]
fn s3_select_returns_on_first() {
    init_tracing();
    let scheduler = Scheduler::new();
    let slow_finished = Rc::new(Cell::new(false));
    let sf = slow_finished.clone();

    let (winner, handle) = scheduler
        .select(vec![
            Box::pin(async { Ok::<_, Error>("immediate") })
                as Pin<Box<dyn Future<Output = Result<&'static str, Error>>>>,
            Box::pin(async move {
                sleep(0.05).await;
                sf.set(true);
                Ok("delayed")
            }),
        ])
        .unwrap();

    assert_eq!(winner, 0);
    assert_eq!(handle.unwrap(), "immediate");
    assert!(!slow_finished.get(), "the losing branch must not be forced to completion");

    scheduler.run();
    assert!(slow_finished.get(), "the losing branch keeps running to completion on its own");
}

/// S4: a task that outlives its registered timeout fails with `Error::Timeout`.
#[test]
fn s4_timeout_fires() {
    init_tracing();
    let scheduler = Scheduler::new();
    let handle = scheduler.await_task(async {
        corun::timeout_after(0.01).await;
        std::future::pending::<()>().await;
        Ok::<(), Error>(())
    });
    match handle.into_result() {
        Err(Error::Timeout(duration)) => assert!(duration.as_secs_f64() > 0.0),
        other => panic!("expected a timeout error, got {other:?}"),
    }
}

/// S4 variant: a task whose future resolves `Ready` in the exact same step
/// its timeout expires still terminates with a timeout error (P4 is
/// unconditional — it carves out no exception for simultaneous completion).
#[test]
fn s4_timeout_outranks_a_simultaneous_ready_completion() {
    init_tracing();
    let scheduler = Scheduler::new();
    let handle = scheduler.await_task(async {
        corun::timeout_after(0.01).await;
        std::thread::sleep(Duration::from_millis(30));
        Ok::<_, Error>("completed normally")
    });
    assert!(matches!(handle.into_result(), Err(Error::Timeout(_))));
}

/// S5: with `maximumPeriod` enabled, `run()` never executes more task steps
/// than the configured budget, however much work is queued.
#[test]
fn s5_maximum_period_caps_work_per_run() {
    init_tracing();
    let scheduler = Scheduler::with_config(
        SchedulerConfig::default()
            .max_concurrent_tasks(1)
            .enable_maximum_period(true)
            .maximum_period(5),
    );
    for _ in 0..20 {
        scheduler.spawn(async {
            sleep(5.0).await;
            Ok::<_, Error>(())
        });
    }
    assert_eq!(scheduler.run(), 5);
}

/// S6: retrying a factory that always fails issues exactly `max_retries`
/// attempts, backing off exponentially between them, then fails.
#[test]
fn s6_retry_with_exponential_backoff() {
    init_tracing();
    let scheduler = Scheduler::new();
    let attempts = Rc::new(Cell::new(0u32));
    let a = attempts.clone();
    let start = Instant::now();

    let handle = scheduler.await_task(async move {
        retry(
            move || {
                let a = a.clone();
                async move {
                    a.set(a.get() + 1);
                    Err::<(), _>(Error::runtime("upstream unavailable"))
                }
            },
            4,
            0.02,
            2.0,
            None,
        )
        .await
    });

    assert!(handle.into_result().is_err());
    assert_eq!(attempts.get(), 4);
    // delays: 0.02, 0.04, 0.08 => at least 0.14s total before giving up.
    assert!(start.elapsed() >= Duration::from_millis(140));
}
