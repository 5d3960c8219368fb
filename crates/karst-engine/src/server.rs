//! User-facing assembly: a thread pool driven by the tick scheduler.
//!
//! [`TickServer`] wires the pieces together for the common case — a
//! realtime server ticking at a fixed rate on background threads. For
//! lockstep embedding (tests, headless tools) construct a
//! [`ThreadPool`] directly and drive [`ThreadPool::tick`] yourself.

use std::sync::Arc;
use std::time::Instant;

use karst_core::FaultSink;

use crate::config::{ConfigError, SchedulerConfig};
use crate::metrics::TickMetrics;
use crate::pool::ThreadPool;
use crate::registry::InstanceRegistry;
use crate::ticker::TickScheduler;

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`TickServer::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence, in milliseconds.
    pub total_ms: u64,
    /// Ticks executed over the server's lifetime.
    pub ticks: u64,
    /// Number of worker threads joined.
    pub workers_joined: usize,
    /// Whether the scheduler thread joined cleanly.
    pub scheduler_joined: bool,
}

// ── TickServer ───────────────────────────────────────────────────

/// A running voxel server core: worker pool plus cadence scheduler.
///
/// Construction spawns all threads and starts ticking immediately.
/// Dropping the server shuts it down.
pub struct TickServer {
    pool: Arc<ThreadPool>,
    scheduler: Option<TickScheduler>,
}

impl std::fmt::Debug for TickServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickServer").finish_non_exhaustive()
    }
}

impl TickServer {
    /// Validate the configuration, spawn the worker pool and the
    /// scheduler thread, and start ticking `registry`.
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<InstanceRegistry>,
        sink: Arc<dyn FaultSink>,
    ) -> Result<Self, ConfigError> {
        let pool = Arc::new(ThreadPool::new(config, registry, Arc::clone(&sink))?);
        let scheduler = TickScheduler::spawn(Arc::clone(&pool), config, sink)?;
        Ok(Self {
            pool,
            scheduler: Some(scheduler),
        })
    }

    /// The registry this server ticks.
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        self.pool.registry()
    }

    /// Snapshot of the scheduling metrics.
    pub fn metrics(&self) -> TickMetrics {
        self.pool.metrics()
    }

    /// Whether the server is still ticking.
    pub fn is_alive(&self) -> bool {
        self.pool.is_alive()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Stop ticking, join all threads, and report. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let start = Instant::now();
        let workers_joined = self.pool.stop();
        let scheduler_joined = match self.scheduler.take() {
            Some(mut scheduler) => scheduler.stop(),
            None => true,
        };
        ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            ticks: self.pool.metrics().ticks,
            workers_joined,
            scheduler_joined,
        }
    }
}

impl Drop for TickServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
