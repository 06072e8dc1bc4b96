// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::cell::Cell;

/// Configuration for a [`MemoryWatchdog`].
#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    /// Soft RSS limit in megabytes. Crossing 80% of this forces a GC pass;
    /// crossing all of it tells the run loop to stop.
    pub soft_limit_mb: u64,
    /// Sample RSS only once every `check_interval` calls to
    /// [`MemoryWatchdog::check_memory_usage`], to keep the syscall off the
    /// hot path.
    pub check_interval: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            soft_limit_mb: 512,
            check_interval: 32,
        }
    }
}

/// Caps RSS and advises the run loop to stop or GC.
///
/// Rust has no garbage collector, so "collect garbage" is reinterpreted as
/// the runtime's own reclamation: the caller-supplied `gc` closure sweeps
/// the scheduler's side-tables and shrinks its queue (see
/// [`crate::scheduler::Scheduler::collect_garbage`], the closure every
/// caller here actually passes in). The watchdog itself only samples RSS
/// and decides when that closure should run; it never touches scheduler
/// state directly.
#[derive(Debug)]
pub struct MemoryWatchdog {
    config: WatchdogConfig,
    calls: Cell<u32>,
    last_rss_mb: Cell<u64>,
}

impl MemoryWatchdog {
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        let watchdog = MemoryWatchdog {
            config,
            calls: Cell::new(0),
            last_rss_mb: Cell::new(0),
        };
        watchdog.init();
        watchdog
    }

    /// Reset sampling state: forget the throttle counter and take a fresh
    /// RSS reading. Called by [`MemoryWatchdog::new`] and by
    /// [`crate::Scheduler::cleanup`] so a watchdog that outlives a torn-down
    /// scheduler doesn't judge the next run against stale history.
    pub fn init(&self) {
        self.calls.set(0);
        self.sample();
    }

    /// Sample RSS (throttled to once per `check_interval` calls) and decide
    /// whether the run loop may keep going.
    ///
    /// Returns `false` once RSS is still over the soft limit even after a
    /// forced GC pass. GC is forced whenever the throttled sample exceeds
    /// 80% of the soft limit.
    pub fn check_memory_usage(&self, gc: impl FnOnce()) -> bool {
        let calls = self.calls.get().wrapping_add(1);
        self.calls.set(calls);
        if calls % self.config.check_interval.max(1) != 0 {
            return true;
        }

        if self.sample() < (self.config.soft_limit_mb * 8) / 10 {
            return true;
        }

        self.force_garbage_collection(gc)
    }

    /// Run `gc` once, unconditionally, and record the RSS it leaves behind.
    /// Unlike [`MemoryWatchdog::check_memory_usage`] this ignores both the
    /// sampling throttle and the 80% threshold — a bare "collect now".
    pub fn collect_garbage(&self, gc: impl FnOnce()) {
        gc();
        self.sample();
    }

    /// [`MemoryWatchdog::collect_garbage`], followed by the same
    /// over-the-soft-limit verdict [`MemoryWatchdog::check_memory_usage`]
    /// reports after it decides to force a GC pass.
    pub fn force_garbage_collection(&self, gc: impl FnOnce()) -> bool {
        self.collect_garbage(gc);
        self.last_rss_mb.get() <= self.config.soft_limit_mb
    }

    #[must_use]
    pub fn last_sampled_rss_mb(&self) -> u64 {
        self.last_rss_mb.get()
    }

    fn sample(&self) -> u64 {
        let rss_mb = sample_rss_mb();
        self.last_rss_mb.set(rss_mb);
        rss_mb
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Reads resident set size from `/proc/self/statm`: the second field
        /// is resident pages; multiply by the page size.
        fn sample_rss_mb() -> u64 {
            let Ok(contents) = std::fs::read_to_string("/proc/self/statm") else {
                return 0;
            };
            let Some(resident_pages) = contents.split_whitespace().nth(1) else {
                return 0;
            };
            let Ok(resident_pages) = resident_pages.parse::<u64>() else {
                return 0;
            };
            // SAFETY: sysconf with a well-known, always-valid name never fails
            // in a way that is unsafe to read; a negative return means
            // "unknown", handled below.
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            let page_size = if page_size > 0 { page_size as u64 } else { 4096 };
            (resident_pages * page_size) / (1024 * 1024)
        }
    } else {
        /// No portable RSS sampler on this platform: always report "ok",
        /// matching the teacher's `cfg`-gated platform split elsewhere in
        /// this codebase (see `libs/fiber/src/stack/unix.rs`'s
        /// `cfg_if!`-based split on `target_os`).
        fn sample_rss_mb() -> u64 {
            0
        }
    }
}
