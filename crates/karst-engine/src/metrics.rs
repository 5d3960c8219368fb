//! Per-tick scheduling metrics.

/// Counters and timings collected by the pool and scheduler.
///
/// Cumulative fields cover the pool's lifetime; `last_*` fields
/// describe the most recent tick. Read a snapshot via
/// [`ThreadPool::metrics`](crate::pool::ThreadPool::metrics).
#[derive(Clone, Debug, Default)]
pub struct TickMetrics {
    /// Ticks executed.
    pub ticks: u64,
    /// Catch-up resets performed by the scheduler.
    pub catch_up_resets: u64,
    /// Batches planned across all ticks.
    pub batches_planned: u64,
    /// Batches dropped because every worker was full.
    pub batches_dropped: u64,
    /// Work items executed across all ticks.
    pub items_executed: u64,
    /// Work items whose tick returned an error.
    pub item_failures: u64,
    /// Planning time of the most recent tick, in microseconds.
    pub last_plan_us: u64,
    /// Wall-clock time of the most recent tick, in microseconds.
    pub last_tick_us: u64,
    /// Cost planned onto each worker in the most recent tick.
    pub last_worker_costs: Vec<u32>,
}
