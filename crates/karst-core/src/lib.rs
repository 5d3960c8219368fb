//! Core types and traits for the Karst voxel server tick core.
//!
//! This is the leaf crate with zero internal Karst dependencies. It
//! defines the fundamental abstractions shared across the workspace:
//! typed identifiers, the three tickable element traits, fault
//! reporting, and the monotonic clock.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod time;
pub mod traits;

// Re-export core types at crate root for convenience.
pub use error::{ElementError, Fault, FaultSink, LogFaultSink};
pub use id::{ChunkPos, ElementKind, EntityId, InstanceId, TickId, WorkerId};
pub use time::monotonic_nanos;
pub use traits::{Chunk, Entity, Instance};
