//! Benchmark fixtures for the Karst tick core.
//!
//! Provides registry profiles shared by the criterion benches:
//!
//! - [`small_profile`]: 1 instance, 9 chunks, 2 entities per chunk
//! - [`reference_profile`]: 4 instances, 64 chunks each, 4 entities
//!   per chunk (~1K elements)

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use karst_core::{ChunkPos, EntityId};
use karst_engine::InstanceRegistry;
use karst_test_utils::{TestChunk, TestEntity, TestInstance};

/// Populate a registry with a grid of chunks and entities.
pub fn populate(
    registry: &InstanceRegistry,
    instances: usize,
    side: i32,
    entities_per_chunk: usize,
) {
    for _ in 0..instances {
        let entry = registry.register_instance(TestInstance::new());
        for x in 0..side {
            for z in 0..side {
                let pos = ChunkPos::new(x, z);
                entry.load_chunk(TestChunk::new(pos)).expect("fresh chunk");
                for _ in 0..entities_per_chunk {
                    entry
                        .spawn_entity(pos, TestEntity::new(EntityId::next()))
                        .expect("chunk loaded");
                }
            }
        }
    }
}

/// Small profile: 1 instance, 3x3 chunks, 2 entities per chunk.
pub fn small_profile() -> Arc<InstanceRegistry> {
    let registry = Arc::new(InstanceRegistry::new());
    populate(&registry, 1, 3, 2);
    registry
}

/// Reference profile: 4 instances, 8x8 chunks, 4 entities per chunk.
pub fn reference_profile() -> Arc<InstanceRegistry> {
    let registry = Arc::new(InstanceRegistry::new());
    populate(&registry, 4, 8, 4);
    registry
}
