//! Worker threads: batch execution and acquisition-queue draining.
//!
//! Each worker owns three queues: a batch queue (planner is the sole
//! producer), an acquisition queue (any thread produces via
//! `scheduled_acquire`, this worker is the sole consumer), and a
//! signal channel (tick start / shutdown). Per tick signal the worker
//! drains its acquisition queue, runs its batches FIFO with a drain
//! after every batch, and arrives at the tick barrier.
//!
//! The worker's identity is published to a thread-local so
//! [`TickHandle::acquire`](crate::handle::TickHandle::acquire) can
//! take the same-thread fast path.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use karst_core::{Fault, WorkerId};

use crate::batch::{Batch, WorkItem};
use crate::handle::AcquireTask;
use crate::pool::PoolShared;
use crate::sync::{Phaser, TickBarrier};

/// Sentinel worker index meaning "no owner".
pub(crate) const WORKER_NONE: u32 = u32::MAX;

/// Sentinel cost meaning "this worker accepts no further batches".
/// The planner never assigns to a worker whose counter carries it.
pub const COST_FULL: u32 = u32::MAX;

// ── Thread-local worker identity ─────────────────────────────────

/// What a worker thread knows about itself, visible to the
/// acquisition protocol via [`context`].
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub index: u32,
    pub foreign: Arc<Phaser>,
}

thread_local! {
    static CONTEXT: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
}

pub(crate) fn context() -> Option<WorkerContext> {
    CONTEXT.with(|c| c.borrow().clone())
}

fn set_context(ctx: WorkerContext) {
    CONTEXT.with(|c| *c.borrow_mut() = Some(ctx));
}

/// The worker index of the calling thread, if it is a pool worker.
pub fn current_worker() -> Option<WorkerId> {
    context().map(|ctx| WorkerId(ctx.index))
}

// ── Worker ───────────────────────────────────────────────────────

/// Per-tick control signal delivered to a worker.
pub(crate) enum Signal {
    /// Run this tick's batches. `now` is the tick-start timestamp.
    Tick { now: u64, barrier: Arc<TickBarrier> },
    /// Finish the current batch and exit.
    Shutdown,
}

/// Shared state of one worker thread.
///
/// Padded to a cache line: the cost counter is written by the planner
/// while neighbouring workers' counters are read in the same scan, and
/// adjacent-field invalidation would make the scan quadratic in
/// coherence traffic.
#[repr(align(128))]
pub(crate) struct Worker {
    index: u32,
    batch_tx: Sender<Batch>,
    batch_rx: Receiver<Batch>,
    task_tx: Sender<AcquireTask>,
    task_rx: Receiver<AcquireTask>,
    signal_tx: Sender<Signal>,
    signal_rx: Receiver<Signal>,
    /// Cost assigned this tick. Written by the planner (sole writer
    /// during planning) and reset by the pool after the barrier.
    cost: AtomicU32,
}

impl Worker {
    pub fn new(index: u32) -> Self {
        let (batch_tx, batch_rx) = crossbeam_channel::unbounded();
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (signal_tx, signal_rx) = crossbeam_channel::unbounded();
        Self {
            index,
            batch_tx,
            batch_rx,
            task_tx,
            task_rx,
            signal_tx,
            signal_rx,
            cost: AtomicU32::new(0),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current assigned cost for this tick.
    pub fn cost(&self) -> u32 {
        self.cost.load(Ordering::Acquire)
    }

    /// Add an assigned batch's cost. Planner only; saturates at the
    /// full sentinel.
    pub fn add_cost(&self, cost: u32) {
        let current = self.cost.load(Ordering::Acquire);
        self.cost
            .store(current.saturating_add(cost), Ordering::Release);
    }

    /// Reset the cost counter after the tick barrier releases.
    pub fn reset_cost(&self) {
        self.cost.store(0, Ordering::Release);
    }

    /// Sender half of the acquisition queue, published into owner
    /// cells by the planner.
    pub fn mailbox(&self) -> Sender<AcquireTask> {
        self.task_tx.clone()
    }

    /// Hand a planned batch to this worker. Planner only.
    pub fn push_batch(&self, batch: Batch) -> Result<(), ()> {
        self.batch_tx.send(batch).map_err(|_| ())
    }

    /// Deliver a control signal. Fails if the worker thread is gone.
    pub fn signal(&self, signal: Signal) -> Result<(), ()> {
        self.signal_tx.send(signal).map_err(|_| ())
    }

    /// Pop an assigned batch without blocking. Test-only: the worker
    /// thread is the sole consumer in production.
    #[cfg(test)]
    pub fn try_pop_batch(&self) -> Result<Batch, crossbeam_channel::TryRecvError> {
        self.batch_rx.try_recv()
    }

    /// Run every acquisition task currently queued.
    fn drain_acquisitions(&self) {
        while let Ok(task) = self.task_rx.try_recv() {
            task();
        }
    }

    /// Execute one batch: items in planning order, each under its
    /// element's monitor, failures reported and skipped.
    fn run_batch(&self, batch: Batch, now: u64, shared: &PoolShared) {
        for item in batch.items() {
            let result = match item {
                WorkItem::Instance(handle) => {
                    let _monitor = handle.lock_monitor();
                    handle.element().tick(now)
                }
                WorkItem::Chunk { chunk, instance } => {
                    let _monitor = chunk.lock_monitor();
                    chunk.element().tick(now, instance.element())
                }
                WorkItem::Entity(handle) => {
                    let _monitor = handle.lock_monitor();
                    handle.element().tick(now)
                }
            };
            shared.note_item(result.is_err());
            if let Err(error) = result {
                shared.sink().handle(Fault::WorkItem {
                    kind: item.kind(),
                    error,
                });
            }
        }
    }
}

// Compile-time assertion: workers are shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Worker>();
};

/// Main loop for one worker thread.
///
/// Runs until a shutdown signal arrives or the signal channel closes.
/// On shutdown mid-tick the worker finishes the batch it is executing,
/// skips the rest of its queue, and still arrives at the barrier.
pub(crate) fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    set_context(WorkerContext {
        index: index as u32,
        foreign: shared.foreign_phaser(),
    });
    let me = shared.worker(index);
    log::debug!("worker {index} started");

    while let Ok(signal) = me.signal_rx.recv() {
        match signal {
            Signal::Shutdown => break,
            Signal::Tick { now, barrier } => {
                me.drain_acquisitions();
                while shared.is_alive() {
                    match me.batch_rx.try_recv() {
                        Ok(batch) => {
                            me.run_batch(batch, now, &shared);
                            me.drain_acquisitions();
                        }
                        Err(_) => break,
                    }
                }
                barrier.arrive();
            }
        }
    }
    log::debug!("worker {index} stopped");
}
