//! Tick scheduling, batch planning, and element acquisition for the
//! Karst voxel server.
//!
//! Every server tick, the engine walks the [`InstanceRegistry`], packs
//! each instance's chunks and entities into a cost-weighted [`Batch`],
//! assigns the batch to the least-loaded worker thread, publishes the
//! owning worker to every element's [`TickHandle`], and runs the
//! batches in parallel behind a tick-complete barrier. Any thread can
//! run a critical section against an element it does not own through
//! [`TickHandle::acquire`] or defer it with
//! [`TickHandle::scheduled_acquire`].
//!
//! [`TickServer`] is the user-facing assembly: a [`ThreadPool`] driven
//! at a fixed cadence by a dedicated [`TickScheduler`] thread. For
//! lockstep-style embedding (tests, headless tools), construct a
//! [`ThreadPool`] directly and call [`ThreadPool::tick`] yourself.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod handle;
pub mod metrics;
pub mod planner;
pub mod pool;
pub mod registry;
pub mod server;
mod sync;
pub mod ticker;
pub mod worker;

pub use batch::{Batch, WorkItem};
pub use config::{ConfigError, ElementCosts, SchedulerConfig};
pub use handle::{OwnerCell, TickHandle};
pub use metrics::TickMetrics;
pub use planner::EntityFilter;
pub use pool::{PoolError, ThreadPool};
pub use registry::{ChunkEntry, InstanceEntry, InstanceRegistry, RegistryError};
pub use server::{ShutdownReport, TickServer};
pub use ticker::TickScheduler;
pub use worker::current_worker;
