//! The tick scheduler: fixed-cadence loop, drift absorption, and
//! catch-up reset.
//!
//! A dedicated thread (`karst-tick`) drives [`ThreadPool::tick`] at
//! the configured rate. Between ticks it performs a hybrid wait —
//! half-interval parked sleeps while the remainder is above the
//! platform sleep threshold, then a spin to the boundary — which
//! converges on the tick edge without oversleeping on coarse-grained
//! timers. When the loop falls more than `max_tick_catch_up` ticks
//! behind real time it drops the backlog and restarts the tick clock
//! from "now" instead of attempting unbounded catch-up.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use karst_core::{monotonic_nanos, Fault, FaultSink};

use crate::config::{ConfigError, SchedulerConfig};
use crate::pool::{PoolError, ThreadPool};

// ── TickScheduler ────────────────────────────────────────────────

/// Handle to the scheduler thread.
///
/// Dropping the handle stops the pool and joins the thread.
pub struct TickScheduler {
    pool: Arc<ThreadPool>,
    thread: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Spawn the scheduler thread and start ticking immediately.
    pub fn spawn(
        pool: Arc<ThreadPool>,
        config: &SchedulerConfig,
        sink: Arc<dyn FaultSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tick_loop = TickLoop {
            pool: Arc::clone(&pool),
            sink,
            tick_nanos: config.tick_nanos(),
            max_catch_up: u64::from(config.max_tick_catch_up),
            sleep_threshold_ns: config.sleep_threshold_ms * 1_000_000,
            base: 0,
            count: 0,
        };
        let thread = thread::Builder::new()
            .name("karst-tick".into())
            .spawn(move || tick_loop.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("tick scheduler: {e}"),
            })?;
        Ok(Self {
            pool,
            thread: Some(thread),
        })
    }

    /// Stop the pool and join the scheduler thread. Idempotent.
    /// Returns whether the thread joined cleanly.
    pub fn stop(&mut self) -> bool {
        self.pool.stop();
        match self.thread.take() {
            Some(handle) => {
                // Wake the loop if it is parked in the hybrid wait.
                handle.thread().unpark();
                handle.join().is_ok()
            }
            None => true,
        }
    }

    /// Whether the scheduler thread is still attached.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── TickLoop ─────────────────────────────────────────────────────

/// State owned by the scheduler thread.
struct TickLoop {
    pool: Arc<ThreadPool>,
    sink: Arc<dyn FaultSink>,
    tick_nanos: u64,
    max_catch_up: u64,
    sleep_threshold_ns: u64,
    /// Monotonic reference the cadence is measured from.
    base: u64,
    /// Ticks since the last reset.
    count: u64,
}

impl TickLoop {
    fn run(mut self) {
        self.base = monotonic_nanos();
        log::debug!(
            "tick scheduler started: {} ns/tick, catch-up limit {}",
            self.tick_nanos,
            self.max_catch_up
        );

        while self.pool.is_alive() {
            let tick_start = monotonic_nanos();
            match self.pool.tick(tick_start) {
                Ok(()) => {}
                // Normal termination path, observed mid-iteration.
                Err(PoolError::Stopped) => break,
                Err(e) => {
                    self.sink.handle(Fault::Scheduler {
                        reason: e.to_string(),
                    });
                }
            }

            self.count += 1;
            let next = self.base + self.count * self.tick_nanos;
            self.wait_until(next);

            // Catch-up guard: if the loop is hopelessly behind, drop
            // the backlog rather than replaying it.
            let now = monotonic_nanos();
            if now > next + self.tick_nanos * self.max_catch_up {
                let behind = (now - next) / self.tick_nanos;
                log::warn!("scheduler fell {behind} ticks behind, resetting tick clock");
                self.pool.note_catch_up_reset();
                self.base = now;
                self.count = 0;
            }
        }
        log::debug!("tick scheduler stopped");
    }

    /// Hybrid wait: parked half-interval sleeps down to the threshold,
    /// then spin. Returns early when the pool dies.
    fn wait_until(&self, next: u64) {
        loop {
            if !self.pool.is_alive() {
                return;
            }
            let now = monotonic_nanos();
            if now >= next {
                return;
            }
            let remaining = next - now;
            if remaining >= self.sleep_threshold_ns {
                thread::park_timeout(Duration::from_nanos(remaining / 2));
            } else {
                std::hint::spin_loop();
            }
        }
    }
}
