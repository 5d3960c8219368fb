//! Tick-internal coordination primitives.
//!
//! [`TickBarrier`] is the countdown the pool waits on each tick: one
//! registration per worker, workers arrive when their batch queue is
//! empty and their acquisition queue is drained. [`Phaser`] tracks
//! in-flight cross-worker acquisitions so tick completion can wait for
//! critical sections a worker started against another worker's
//! element.

use std::sync::{Arc, Condvar, Mutex};

// ── TickBarrier ──────────────────────────────────────────────────

/// Countdown latch for tick completion.
///
/// Created fresh each tick with one count per worker. `arrive` is
/// called once per worker; `wait` blocks the coordinator until all
/// arrivals.
pub(crate) struct TickBarrier {
    remaining: Mutex<usize>,
    all_arrived: Condvar,
}

impl TickBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            remaining: Mutex::new(parties),
            all_arrived: Condvar::new(),
        }
    }

    /// Record one arrival. The final arrival wakes the coordinator.
    pub fn arrive(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.all_arrived.notify_all();
        }
    }

    /// Block until every party has arrived.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        while *remaining > 0 {
            remaining = self.all_arrived.wait(remaining).unwrap();
        }
    }
}

// ── Phaser ───────────────────────────────────────────────────────

/// Register/arrive tracker for in-flight cross-worker acquisitions.
///
/// A worker registers before entering a foreign element's monitor and
/// arrives (deregisters) after releasing it. The pool waits for the
/// phaser to go idle after the tick barrier, so a tick never completes
/// with a cross-worker critical section still running.
pub(crate) struct Phaser {
    active: Mutex<usize>,
    idle: Condvar,
}

impl Phaser {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// Register one in-flight party; deregistered when the returned
    /// guard drops.
    pub fn register(self: &Arc<Self>) -> PhaserGuard {
        *self.active.lock().unwrap() += 1;
        PhaserGuard {
            phaser: Arc::clone(self),
        }
    }

    fn arrive(&self) {
        let mut active = self.active.lock().unwrap();
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.idle.notify_all();
        }
    }

    /// Block until no party is registered.
    pub fn wait_idle(&self) {
        let mut active = self.active.lock().unwrap();
        while *active > 0 {
            active = self.idle.wait(active).unwrap();
        }
    }
}

/// Deregisters its [`Phaser`] party on drop, so the arrival happens on
/// every exit path of the critical section.
pub(crate) struct PhaserGuard {
    phaser: Arc<Phaser>,
}

impl Drop for PhaserGuard {
    fn drop(&mut self) {
        self.phaser.arrive();
    }
}

// Compile-time assertion: both primitives cross thread boundaries.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TickBarrier>();
    assert::<Phaser>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn barrier_releases_after_all_arrivals() {
        let barrier = Arc::new(TickBarrier::new(3));
        let released = Arc::new(AtomicBool::new(false));

        let waiter = {
            let barrier = Arc::clone(&barrier);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                barrier.wait();
                released.store(true, Ordering::Release);
            })
        };

        barrier.arrive();
        barrier.arrive();
        thread::sleep(Duration::from_millis(20));
        assert!(
            !released.load(Ordering::Acquire),
            "barrier released before final arrival"
        );

        barrier.arrive();
        waiter.join().unwrap();
        assert!(released.load(Ordering::Acquire));
    }

    #[test]
    fn barrier_with_zero_parties_is_immediate() {
        let barrier = TickBarrier::new(0);
        barrier.wait();
    }

    #[test]
    fn phaser_idle_waits_for_guards() {
        let phaser = Arc::new(Phaser::new());
        let guard = phaser.register();

        let done = Arc::new(AtomicBool::new(false));
        let waiter = {
            let phaser = Arc::clone(&phaser);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                phaser.wait_idle();
                done.store(true, Ordering::Release);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!done.load(Ordering::Acquire), "idle before guard dropped");

        drop(guard);
        waiter.join().unwrap();
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn phaser_guard_arrives_on_panic_path() {
        let phaser = Arc::new(Phaser::new());
        let p = Arc::clone(&phaser);
        let result = thread::spawn(move || {
            let _guard = p.register();
            panic!("callback failed");
        })
        .join();
        assert!(result.is_err());
        // The guard must have deregistered during unwinding.
        phaser.wait_idle();
    }
}
