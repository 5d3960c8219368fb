//! The worker thread pool and the per-tick execution protocol.
//!
//! [`ThreadPool::tick`] is the synchronous heart of the engine: plan
//! batches, signal every worker, wait for the tick barrier, wait for
//! in-flight cross-worker acquisitions, reset cost counters. The tick
//! scheduler calls it once per cadence step; tests and lockstep
//! embeddings may call it directly.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use karst_core::FaultSink;

use crate::config::{ConfigError, ElementCosts, SchedulerConfig};
use crate::metrics::TickMetrics;
use crate::planner::{self, EntityFilter};
use crate::registry::InstanceRegistry;
use crate::sync::{Phaser, TickBarrier};
use crate::worker::{worker_loop, Signal, Worker};

// ── PoolError ────────────────────────────────────────────────────

/// Errors from [`ThreadPool::tick`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been stopped.
    Stopped,
    /// A worker's signal channel is disconnected (its thread exited
    /// outside the shutdown protocol). The tick still ran on the
    /// remaining workers.
    WorkerDisconnected {
        /// Index of the unreachable worker.
        index: u32,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "thread pool is stopped"),
            Self::WorkerDisconnected { index } => {
                write!(f, "worker {index} is disconnected")
            }
        }
    }
}

impl Error for PoolError {}

// ── PoolShared ───────────────────────────────────────────────────

/// State shared between the pool handle and its worker threads.
pub(crate) struct PoolShared {
    workers: Box<[Worker]>,
    alive: AtomicBool,
    foreign: Arc<Phaser>,
    sink: Arc<dyn FaultSink>,
    items_executed: AtomicU64,
    item_failures: AtomicU64,
}

impl PoolShared {
    pub fn worker(&self, index: usize) -> &Worker {
        &self.workers[index]
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn foreign_phaser(&self) -> Arc<Phaser> {
        Arc::clone(&self.foreign)
    }

    pub fn sink(&self) -> &dyn FaultSink {
        &*self.sink
    }

    /// Record one executed work item and whether it failed.
    pub fn note_item(&self, failed: bool) {
        self.items_executed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.item_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ── ThreadPool ───────────────────────────────────────────────────

/// Fixed-size pool of worker threads plus the per-tick protocol.
///
/// Workers are spawned in [`new`](Self::new) and joined in
/// [`stop`](Self::stop) (or on drop). [`tick`](Self::tick) must have a
/// single caller at a time — normally the [`TickScheduler`] thread.
///
/// [`TickScheduler`]: crate::ticker::TickScheduler
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    registry: Arc<InstanceRegistry>,
    costs: ElementCosts,
    filter: Mutex<Option<Arc<EntityFilter>>>,
    metrics: Mutex<TickMetrics>,
}

impl ThreadPool {
    /// Validate the configuration and spawn the worker threads.
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<InstanceRegistry>,
        sink: Arc<dyn FaultSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let count = config.resolved_worker_count();

        let workers: Box<[Worker]> = (0..count as u32).map(Worker::new).collect();
        let shared = Arc::new(PoolShared {
            workers,
            alive: AtomicBool::new(true),
            foreign: Arc::new(Phaser::new()),
            sink,
            items_executed: AtomicU64::new(0),
            item_failures: AtomicU64::new(0),
        });

        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let worker_shared = Arc::clone(&shared);
            let spawn = thread::Builder::new()
                .name(format!("karst-worker-{index}"))
                .spawn(move || worker_loop(worker_shared, index));
            match spawn {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    // Unwind the partially-started pool before failing.
                    shared.alive.store(false, Ordering::Release);
                    for worker in shared.workers() {
                        let _ = worker.signal(Signal::Shutdown);
                    }
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(ConfigError::ThreadSpawnFailed {
                        reason: format!("worker {index}: {e}"),
                    });
                }
            }
        }
        log::debug!("thread pool started with {count} workers");

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
            registry,
            costs: config.costs,
            filter: Mutex::new(None),
            metrics: Mutex::new(TickMetrics::default()),
        })
    }

    /// Replace the entity filter applied during planning. `None`
    /// ticks every entity.
    pub fn set_entity_filter(&self, filter: Option<Arc<EntityFilter>>) {
        *self.filter.lock().unwrap() = filter;
    }

    /// Run one tick synchronously.
    ///
    /// Returns after every worker has finished every batch planned for
    /// this tick, drained its acquisition queue, and any in-flight
    /// cross-worker acquisition has completed. `now` is the tick-start
    /// timestamp passed through to every element's `tick`.
    pub fn tick(&self, now: u64) -> Result<(), PoolError> {
        if !self.is_alive() {
            return Err(PoolError::Stopped);
        }
        let tick_start = Instant::now();

        let filter = self.filter.lock().unwrap().clone();
        let summary = planner::plan_tick(
            &self.registry,
            self.shared.workers(),
            &self.costs,
            filter.as_ref(),
            self.shared.sink(),
        );
        let worker_costs: Vec<u32> = self.shared.workers().iter().map(|w| w.cost()).collect();
        let plan_us = tick_start.elapsed().as_micros() as u64;

        // One barrier registration per worker: batch-less workers
        // still drain their acquisition queues before arriving.
        let barrier = Arc::new(TickBarrier::new(self.shared.workers().len()));
        let mut disconnected = None;
        for worker in self.shared.workers() {
            let signal = Signal::Tick {
                now,
                barrier: Arc::clone(&barrier),
            };
            if worker.signal(signal).is_err() {
                // Arrive on the dead worker's behalf so the barrier
                // still releases.
                disconnected.get_or_insert(worker.index());
                barrier.arrive();
            }
        }
        barrier.wait();
        self.shared.foreign.wait_idle();

        for worker in self.shared.workers() {
            worker.reset_cost();
        }

        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.ticks += 1;
            metrics.batches_planned += summary.batches;
            metrics.batches_dropped += summary.dropped;
            metrics.items_executed = self.shared.items_executed.load(Ordering::Relaxed);
            metrics.item_failures = self.shared.item_failures.load(Ordering::Relaxed);
            metrics.last_plan_us = plan_us;
            metrics.last_tick_us = tick_start.elapsed().as_micros() as u64;
            metrics.last_worker_costs = worker_costs;
        }

        match disconnected {
            // A worker that vanished because stop() raced this tick is
            // shutdown, not a fault.
            Some(_) if !self.is_alive() => Err(PoolError::Stopped),
            Some(index) => Err(PoolError::WorkerDisconnected { index }),
            None => Ok(()),
        }
    }

    /// Whether the pool accepts ticks.
    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Stop the pool: workers finish their current batch and exit.
    /// Idempotent. Returns the number of worker threads joined.
    pub fn stop(&self) -> usize {
        if self.shared.alive.swap(false, Ordering::AcqRel) {
            for worker in self.shared.workers() {
                let _ = worker.signal(Signal::Shutdown);
            }
        }
        let mut joined = 0;
        for handle in self.threads.lock().unwrap().drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        if joined > 0 {
            log::debug!("thread pool stopped, {joined} workers joined");
        }
        joined
    }

    /// Snapshot of the pool's metrics.
    pub fn metrics(&self) -> TickMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Count one catch-up reset. Scheduler only.
    pub(crate) fn note_catch_up_reset(&self) {
        self.metrics.lock().unwrap().catch_up_resets += 1;
    }

    /// The registry this pool schedules.
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.workers().len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karst_core::{monotonic_nanos, ChunkPos, EntityId, LogFaultSink};
    use karst_test_utils::{CollectingSink, TestChunk, TestEntity, TestInstance};

    fn pool_with(worker_count: usize, registry: Arc<InstanceRegistry>) -> ThreadPool {
        let config = SchedulerConfig {
            worker_count: Some(worker_count),
            ..SchedulerConfig::default()
        };
        ThreadPool::new(&config, registry, Arc::new(LogFaultSink)).unwrap()
    }

    #[test]
    fn tick_runs_every_element_once() {
        let registry = Arc::new(InstanceRegistry::new());
        let instance = TestInstance::new();
        let instance_ticks = instance.counter();
        let entry = registry.register_instance(instance);

        let mut counters = Vec::new();
        for x in 0..2 {
            let pos = ChunkPos::new(x, 0);
            let chunk = TestChunk::new(pos);
            counters.push(chunk.counter());
            entry.load_chunk(chunk).unwrap();
            for _ in 0..3 {
                let entity = TestEntity::new(EntityId::next());
                counters.push(entity.counter());
                entry.spawn_entity(pos, entity).unwrap();
            }
        }

        let pool = pool_with(2, Arc::clone(&registry));
        pool.tick(monotonic_nanos()).unwrap();

        assert_eq!(instance_ticks.get(), 1);
        for counter in &counters {
            assert_eq!(counter.get(), 1);
        }

        let metrics = pool.metrics();
        assert_eq!(metrics.ticks, 1);
        // Instance batch plus one batch per chunk.
        assert_eq!(metrics.batches_planned, 3);
        assert_eq!(metrics.items_executed, 9);
        assert_eq!(metrics.item_failures, 0);
        pool.stop();
    }

    #[test]
    fn cost_counters_reset_after_tick() {
        let registry = Arc::new(InstanceRegistry::new());
        let entry = registry.register_instance(TestInstance::new());
        entry.load_chunk(TestChunk::new(ChunkPos::new(0, 0))).unwrap();

        let pool = pool_with(2, Arc::clone(&registry));
        pool.tick(monotonic_nanos()).unwrap();

        let metrics = pool.metrics();
        assert_eq!(metrics.last_worker_costs.iter().sum::<u32>(), 10);
        for worker in pool.shared.workers() {
            assert_eq!(worker.cost(), 0);
        }
        pool.stop();
    }

    #[test]
    fn tick_after_stop_errors() {
        let registry = Arc::new(InstanceRegistry::new());
        let pool = pool_with(1, registry);
        pool.stop();
        assert_eq!(pool.tick(monotonic_nanos()), Err(PoolError::Stopped));
    }

    #[test]
    fn stop_is_idempotent() {
        let registry = Arc::new(InstanceRegistry::new());
        let pool = pool_with(3, registry);
        assert_eq!(pool.stop(), 3);
        assert_eq!(pool.stop(), 0);
        assert!(!pool.is_alive());
    }

    #[test]
    fn empty_registry_ticks_cleanly() {
        let registry = Arc::new(InstanceRegistry::new());
        let pool = pool_with(2, registry);
        for _ in 0..5 {
            pool.tick(monotonic_nanos()).unwrap();
        }
        let metrics = pool.metrics();
        assert_eq!(metrics.ticks, 5);
        assert_eq!(metrics.batches_planned, 0);
        pool.stop();
    }

    #[test]
    fn item_failure_is_reported_not_fatal() {
        let registry = Arc::new(InstanceRegistry::new());
        let entry = registry.register_instance(TestInstance::new());
        let pos = ChunkPos::new(0, 0);
        entry.load_chunk(TestChunk::new(pos)).unwrap();
        entry
            .spawn_entity(pos, TestEntity::failing(EntityId::next(), "bad pathfind"))
            .unwrap();
        let survivor = TestEntity::new(EntityId::next());
        let survivor_ticks = survivor.counter();
        entry.spawn_entity(pos, survivor).unwrap();

        let sink = Arc::new(CollectingSink::new());
        let config = SchedulerConfig {
            worker_count: Some(2),
            ..SchedulerConfig::default()
        };
        let pool = ThreadPool::new(&config, Arc::clone(&registry), sink.clone()).unwrap();
        pool.tick(monotonic_nanos()).unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(survivor_ticks.get(), 1);
        assert_eq!(pool.metrics().item_failures, 1);
        pool.stop();
    }
}
