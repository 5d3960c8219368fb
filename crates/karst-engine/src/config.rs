//! Scheduler configuration, validation, and error types.
//!
//! [`SchedulerConfig`] is the input for constructing a [`ThreadPool`]
//! and [`TickScheduler`]. All structural invariants are checked by
//! [`validate()`](SchedulerConfig::validate) at construction time;
//! misconfiguration is the one fatal error class in the engine.
//!
//! [`ThreadPool`]: crate::pool::ThreadPool
//! [`TickScheduler`]: crate::ticker::TickScheduler

use std::error::Error;
use std::fmt;

use karst_core::ElementKind;

// ── ElementCosts ───────────────────────────────────────────────────

/// Per-kind cost estimates used by the batch planner.
///
/// Costs are relative weights, not time units. The planner sums them
/// per batch and balances batch totals across workers. Each cost must
/// be strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementCosts {
    /// Cost of ticking an instance. Default: 5.
    pub instance: u32,
    /// Cost of ticking a chunk. Default: 5.
    pub chunk: u32,
    /// Cost of ticking an entity. Default: 5.
    pub entity: u32,
}

impl Default for ElementCosts {
    fn default() -> Self {
        Self {
            instance: 5,
            chunk: 5,
            entity: 5,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SchedulerConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `ticks_per_second` is zero or above the supported maximum.
    InvalidTickRate {
        /// The invalid value.
        value: u32,
    },
    /// An explicit worker count of zero was configured.
    ZeroWorkers,
    /// `max_tick_catch_up` is zero.
    InvalidCatchUp,
    /// `sleep_threshold_ms` is zero.
    InvalidSleepThreshold,
    /// A per-kind cost is zero.
    InvalidCost {
        /// Which element kind carried the invalid cost.
        kind: ElementKind,
        /// The invalid value.
        value: u32,
    },
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTickRate { value } => {
                write!(
                    f,
                    "ticks_per_second must be in 1..={MAX_TICKS_PER_SECOND}, got {value}"
                )
            }
            Self::ZeroWorkers => write!(f, "worker_count must be at least 1"),
            Self::InvalidCatchUp => write!(f, "max_tick_catch_up must be at least 1"),
            Self::InvalidSleepThreshold => write!(f, "sleep_threshold_ms must be at least 1"),
            Self::InvalidCost { kind, value } => {
                write!(f, "{kind} cost must be strictly positive, got {value}")
            }
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}

// ── SchedulerConfig ────────────────────────────────────────────────

/// Upper bound on the configurable tick rate.
///
/// One tick per millisecond is already far below the resolution the
/// hybrid wait can hold on coarse-timer platforms.
pub const MAX_TICKS_PER_SECOND: u32 = 1000;

/// Maximum worker threads, matching the clamp applied to auto-detected
/// counts.
pub const MAX_WORKERS: usize = 64;

/// Complete configuration for the tick scheduler and thread pool.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Target tick rate. Default: 20.
    pub ticks_per_second: u32,
    /// Number of ticks behind real time before the scheduler drops its
    /// backlog and resets the tick clock. Default: 5.
    pub max_tick_catch_up: u32,
    /// Number of worker threads. `None` = auto-detect from logical
    /// core count, clamped to `[1, 64]`. Explicit zero is rejected by
    /// [`validate()`](Self::validate); explicit values above 64 are
    /// clamped.
    pub worker_count: Option<usize>,
    /// Minimum remaining wait (milliseconds) for which the hybrid wait
    /// sleeps rather than spins. Platform default: 17 on Windows
    /// (coarse timer granularity), 2 elsewhere.
    pub sleep_threshold_ms: u64,
    /// Per-kind planning costs.
    pub costs: ElementCosts,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 20,
            max_tick_catch_up: 5,
            worker_count: None,
            sleep_threshold_ms: if cfg!(windows) { 17 } else { 2 },
            costs: ElementCosts::default(),
        }
    }
}

impl SchedulerConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_second == 0 || self.ticks_per_second > MAX_TICKS_PER_SECOND {
            return Err(ConfigError::InvalidTickRate {
                value: self.ticks_per_second,
            });
        }
        if self.worker_count == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.max_tick_catch_up == 0 {
            return Err(ConfigError::InvalidCatchUp);
        }
        if self.sleep_threshold_ms == 0 {
            return Err(ConfigError::InvalidSleepThreshold);
        }
        for (kind, value) in [
            (ElementKind::Instance, self.costs.instance),
            (ElementKind::Chunk, self.costs.chunk),
            (ElementKind::Entity, self.costs.entity),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCost { kind, value });
            }
        }
        Ok(())
    }

    /// The tick period in nanoseconds.
    pub fn tick_nanos(&self) -> u64 {
        1_000_000_000 / u64::from(self.ticks_per_second)
    }

    /// Resolve the actual worker count, applying auto-detection if
    /// `None`. Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, MAX_WORKERS),
        }
    }
}
