//! Element errors, the fault taxonomy, and the fault sink.
//!
//! Work-item and scheduler failures never abort a tick: they are
//! converted into [`Fault`] values and handed to the pool's
//! [`FaultSink`]. Acquisition-callback failures are not routed here —
//! they surface at the caller of `acquire` through the callback's own
//! return value.

use std::error::Error;
use std::fmt;

use crate::id::ElementKind;

/// Error returned by an element's `tick`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementError {
    /// The element's tick logic failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A domain constraint was violated during the tick.
    ConstraintViolation {
        /// Description of the violated constraint.
        constraint: String,
    },
}

impl fmt::Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::ConstraintViolation { constraint } => {
                write!(f, "constraint violation: {constraint}")
            }
        }
    }
}

impl Error for ElementError {}

/// A non-fatal failure reported to the pool's [`FaultSink`].
#[derive(Clone, Debug)]
pub enum Fault {
    /// A work item's tick failed. The worker continues with the next
    /// item in the batch.
    WorkItem {
        /// Which kind of element failed.
        kind: ElementKind,
        /// The underlying element error.
        error: ElementError,
    },
    /// A tick-level step failed inside the scheduler loop. The loop
    /// continues with the next tick.
    Scheduler {
        /// Description of the failing step.
        reason: String,
    },
    /// A planned batch could not be assigned because every worker's
    /// cost counter carried the full sentinel.
    BatchDropped {
        /// Total cost of the dropped batch.
        cost: u32,
    },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkItem { kind, error } => write!(f, "{kind} tick failed: {error}"),
            Self::Scheduler { reason } => write!(f, "scheduler step failed: {reason}"),
            Self::BatchDropped { cost } => {
                write!(f, "batch of cost {cost} dropped: all workers full")
            }
        }
    }
}

/// Sink for non-fatal faults.
///
/// Implementations must be cheap and non-blocking: `handle` is called
/// from worker threads mid-tick and from the scheduler loop.
pub trait FaultSink: Send + Sync {
    /// Report a fault. Must not panic.
    fn handle(&self, fault: Fault);
}

/// Default sink that forwards faults to the `log` crate at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFaultSink;

impl FaultSink for LogFaultSink {
    fn handle(&self, fault: Fault) {
        log::error!("{fault}");
    }
}
