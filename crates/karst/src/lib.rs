//! Karst: the tick-scheduling and element-acquisition core for
//! multiplayer voxel game servers.
//!
//! This is the top-level facade crate that re-exports the public API
//! from the Karst sub-crates. For most users, adding `karst` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use karst::prelude::*;
//! use std::sync::Arc;
//!
//! // A minimal instance with no instance-level behaviour.
//! struct Lobby;
//! impl Instance for Lobby {
//!     fn tick(&self, _now: u64) -> Result<(), ElementError> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = Arc::new(InstanceRegistry::new());
//! registry.register_instance(Lobby);
//!
//! // Lockstep: drive the pool by hand.
//! let config = SchedulerConfig {
//!     worker_count: Some(2),
//!     ..SchedulerConfig::default()
//! };
//! let pool = ThreadPool::new(&config, Arc::clone(&registry), Arc::new(LogFaultSink)).unwrap();
//! pool.tick(monotonic_nanos()).unwrap();
//! assert_eq!(pool.metrics().ticks, 1);
//! pool.stop();
//! ```
//!
//! For a realtime server ticking on background threads, use
//! [`TickServer`] instead of driving [`ThreadPool::tick`] yourself.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub use karst_core::{
    monotonic_nanos, Chunk, ChunkPos, ElementError, ElementKind, Entity, EntityId, Fault,
    FaultSink, Instance, InstanceId, LogFaultSink, TickId, WorkerId,
};
pub use karst_engine::{
    current_worker, Batch, ChunkEntry, ConfigError, ElementCosts, EntityFilter, InstanceEntry,
    InstanceRegistry, PoolError, RegistryError, SchedulerConfig, ShutdownReport, ThreadPool,
    TickHandle, TickMetrics, TickScheduler, TickServer, WorkItem,
};

/// One-stop imports for the common API surface.
pub mod prelude {
    pub use karst_core::{
        monotonic_nanos, Chunk, ChunkPos, ElementError, Entity, EntityId, Fault, FaultSink,
        Instance, InstanceId, LogFaultSink,
    };
    pub use karst_engine::{
        ElementCosts, InstanceRegistry, SchedulerConfig, ThreadPool, TickHandle, TickServer,
    };
}
