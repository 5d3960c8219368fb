//! Work items and batches.
//!
//! A [`WorkItem`] is a tagged variant over the three element kinds, so
//! the worker dispatches by tag rather than by runtime type test. A
//! [`Batch`] is an ordered list of work items plus its total planning
//! cost, owned by exactly one worker from hand-over to completion.

use karst_core::{Chunk, ElementKind, Entity, Instance};

use crate::handle::{OwnerCell, TickHandle};

/// One schedulable unit of tick work.
pub enum WorkItem {
    /// Tick an instance.
    Instance(TickHandle<dyn Instance>),
    /// Tick a chunk. The owning instance is carried alongside so the
    /// chunk is never ticked detached from it.
    Chunk {
        /// The chunk to tick.
        chunk: TickHandle<dyn Chunk>,
        /// The instance the chunk belongs to.
        instance: TickHandle<dyn Instance>,
    },
    /// Tick an entity.
    Entity(TickHandle<dyn Entity>),
}

impl WorkItem {
    /// Which kind of element this item ticks.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Instance(_) => ElementKind::Instance,
            Self::Chunk { .. } => ElementKind::Chunk,
            Self::Entity(_) => ElementKind::Entity,
        }
    }

    /// The owner slot of the handle this item ticks.
    pub(crate) fn owner_cell(&self) -> &OwnerCell {
        match self {
            Self::Instance(h) => h.owner(),
            Self::Chunk { chunk, .. } => chunk.owner(),
            Self::Entity(h) => h.owner(),
        }
    }
}

/// An ordered sequence of work items with its total cost.
pub struct Batch {
    items: Vec<WorkItem>,
    cost: u32,
}

impl Batch {
    /// Start an empty batch.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cost: 0,
        }
    }

    /// Append an item, accumulating its cost.
    pub fn add(&mut self, item: WorkItem, cost: u32) {
        self.items.push(item);
        self.cost = self.cost.saturating_add(cost);
    }

    /// Items in planning order.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Total planned cost.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karst_core::{ChunkPos, ElementError, EntityId};

    struct NullInstance;
    impl Instance for NullInstance {
        fn tick(&self, _now: u64) -> Result<(), ElementError> {
            Ok(())
        }
    }

    struct NullChunk;
    impl Chunk for NullChunk {
        fn position(&self) -> ChunkPos {
            ChunkPos::new(0, 0)
        }
        fn tick(&self, _now: u64, _instance: &dyn Instance) -> Result<(), ElementError> {
            Ok(())
        }
    }

    struct NullEntity(EntityId);
    impl Entity for NullEntity {
        fn id(&self) -> EntityId {
            self.0
        }
        fn tick(&self, _now: u64) -> Result<(), ElementError> {
            Ok(())
        }
    }

    fn instance_handle() -> TickHandle<dyn Instance> {
        TickHandle::from_instance(NullInstance)
    }

    #[test]
    fn batch_accumulates_cost_in_order() {
        let mut batch = Batch::new();
        batch.add(WorkItem::Instance(instance_handle()), 5);
        batch.add(
            WorkItem::Chunk {
                chunk: TickHandle::from_chunk(NullChunk),
                instance: instance_handle(),
            },
            5,
        );
        batch.add(
            WorkItem::Entity(TickHandle::from_entity(NullEntity(EntityId(1)))),
            3,
        );

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.cost(), 13);
        assert_eq!(batch.items()[0].kind(), ElementKind::Instance);
        assert_eq!(batch.items()[1].kind(), ElementKind::Chunk);
        assert_eq!(batch.items()[2].kind(), ElementKind::Entity);
    }

    #[test]
    fn empty_batch() {
        let batch = Batch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.cost(), 0);
    }

    #[test]
    fn cost_saturates() {
        let mut batch = Batch::new();
        batch.add(WorkItem::Instance(instance_handle()), u32::MAX);
        batch.add(WorkItem::Instance(instance_handle()), 100);
        assert_eq!(batch.cost(), u32::MAX);
    }
}
