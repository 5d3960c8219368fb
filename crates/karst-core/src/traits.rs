//! The three tickable element traits.
//!
//! Elements are shared, multi-reader objects: every method takes
//! `&self` and implementations use interior mutability. Exclusion is a
//! protocol property, not a type-system one — during a tick an element
//! is mutated only by its owning worker, and any other thread must go
//! through the acquisition protocol in `karst-engine`.

use crate::error::ElementError;
use crate::id::{ChunkPos, EntityId};

/// A loaded world: the root of the chunk/entity hierarchy.
pub trait Instance: Send + Sync {
    /// Advance instance-level state by one tick.
    ///
    /// `now` is the monotonic timestamp of the tick start, in
    /// nanoseconds.
    fn tick(&self, now: u64) -> Result<(), ElementError>;
}

/// A loaded region of an instance.
pub trait Chunk: Send + Sync {
    /// The chunk's position within its instance.
    fn position(&self) -> ChunkPos;

    /// Advance chunk-level state by one tick.
    ///
    /// The owning instance is always passed explicitly; a chunk is
    /// never ticked detached from its instance.
    fn tick(&self, now: u64, instance: &dyn Instance) -> Result<(), ElementError>;
}

/// A mobile object resident in exactly one chunk at a time.
pub trait Entity: Send + Sync {
    /// The entity's unique identifier.
    fn id(&self) -> EntityId;

    /// Advance entity state by one tick.
    fn tick(&self, now: u64) -> Result<(), ElementError>;
}
