//! Instance registry: arena-style storage for instances, chunks, and
//! entities.
//!
//! Ownership is strictly downward — the registry owns instance
//! entries, an instance entry owns chunk entries by position, a chunk
//! entry owns entity handles by ID. There are no back-references; code
//! that needs to go "up" looks the parent up by identifier. The
//! planner enumerates through Arc-clone snapshots, so no registry lock
//! is held across batch planning.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use smallvec::SmallVec;

use karst_core::{Chunk, ChunkPos, Entity, EntityId, Instance, InstanceId};

use crate::handle::TickHandle;

// ── RegistryError ────────────────────────────────────────────────

/// Errors from registry mutation operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// No instance with this ID is registered.
    UnknownInstance(InstanceId),
    /// The chunk position is already loaded in this instance.
    ChunkAlreadyLoaded(ChunkPos),
    /// No chunk is loaded at this position.
    UnknownChunk(ChunkPos),
    /// No entity with this ID is resident in the chunk.
    UnknownEntity(EntityId),
    /// An entity with this ID is already resident in the target chunk.
    DuplicateEntity(EntityId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownInstance(id) => write!(f, "unknown instance {id}"),
            Self::ChunkAlreadyLoaded(pos) => write!(f, "chunk {pos} already loaded"),
            Self::UnknownChunk(pos) => write!(f, "no chunk loaded at {pos}"),
            Self::UnknownEntity(id) => write!(f, "unknown entity {id}"),
            Self::DuplicateEntity(id) => write!(f, "entity {id} already present"),
        }
    }
}

impl Error for RegistryError {}

// ── ChunkEntry ───────────────────────────────────────────────────

/// A loaded chunk and its resident entities.
pub struct ChunkEntry {
    position: ChunkPos,
    handle: TickHandle<dyn Chunk>,
    entities: RwLock<IndexMap<EntityId, TickHandle<dyn Entity>>>,
}

impl ChunkEntry {
    fn new(chunk: impl Chunk + 'static) -> Self {
        Self {
            position: chunk.position(),
            handle: TickHandle::from_chunk(chunk),
            entities: RwLock::new(IndexMap::new()),
        }
    }

    /// The chunk's position within its instance.
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    /// The chunk's scheduling handle.
    pub fn handle(&self) -> TickHandle<dyn Chunk> {
        self.handle.clone()
    }

    /// Snapshot of resident entity handles, in residence order.
    pub fn entities(&self) -> SmallVec<[TickHandle<dyn Entity>; 8]> {
        self.entities.read().unwrap().values().cloned().collect()
    }

    /// Number of resident entities.
    pub fn entity_count(&self) -> usize {
        self.entities.read().unwrap().len()
    }

    /// Whether an entity is resident here.
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.read().unwrap().contains_key(&id)
    }

    /// Look up a resident entity's handle.
    pub fn entity(&self, id: EntityId) -> Option<TickHandle<dyn Entity>> {
        self.entities.read().unwrap().get(&id).cloned()
    }
}

// ── InstanceEntry ────────────────────────────────────────────────

/// A registered instance and its loaded chunks.
pub struct InstanceEntry {
    id: InstanceId,
    handle: TickHandle<dyn Instance>,
    chunks: RwLock<IndexMap<ChunkPos, Arc<ChunkEntry>>>,
}

impl InstanceEntry {
    /// The instance's ID.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The instance's scheduling handle.
    pub fn handle(&self) -> TickHandle<dyn Instance> {
        self.handle.clone()
    }

    /// Load a chunk at its own position. Fails if the position is
    /// already loaded.
    pub fn load_chunk(
        &self,
        chunk: impl Chunk + 'static,
    ) -> Result<TickHandle<dyn Chunk>, RegistryError> {
        let entry = ChunkEntry::new(chunk);
        let pos = entry.position();
        let handle = entry.handle();
        let mut chunks = self.chunks.write().unwrap();
        if chunks.contains_key(&pos) {
            return Err(RegistryError::ChunkAlreadyLoaded(pos));
        }
        chunks.insert(pos, Arc::new(entry));
        Ok(handle)
    }

    /// Unload the chunk at `pos`, dropping its resident entities from
    /// scheduling. Their owner slots are cleared so a late
    /// `scheduled_acquire` runs inline rather than landing in a dead
    /// worker queue.
    pub fn unload_chunk(&self, pos: ChunkPos) -> Result<(), RegistryError> {
        let entry = self
            .chunks
            .write()
            .unwrap()
            .shift_remove(&pos)
            .ok_or(RegistryError::UnknownChunk(pos))?;
        entry.handle.owner().clear();
        for entity in entry.entities() {
            entity.owner().clear();
        }
        Ok(())
    }

    /// The chunk entry at `pos`, if loaded.
    pub fn chunk_at(&self, pos: ChunkPos) -> Option<Arc<ChunkEntry>> {
        self.chunks.read().unwrap().get(&pos).cloned()
    }

    /// Snapshot of loaded chunk entries, in load order.
    pub fn chunks(&self) -> Vec<Arc<ChunkEntry>> {
        self.chunks.read().unwrap().values().cloned().collect()
    }

    /// Number of loaded chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    /// Spawn an entity into the chunk at `pos`.
    pub fn spawn_entity(
        &self,
        pos: ChunkPos,
        entity: impl Entity + 'static,
    ) -> Result<TickHandle<dyn Entity>, RegistryError> {
        let chunk = self
            .chunk_at(pos)
            .ok_or(RegistryError::UnknownChunk(pos))?;
        let id = entity.id();
        let handle = TickHandle::from_entity(entity);
        let mut entities = chunk.entities.write().unwrap();
        if entities.contains_key(&id) {
            return Err(RegistryError::DuplicateEntity(id));
        }
        entities.insert(id, handle.clone());
        Ok(handle)
    }

    /// Remove an entity from the chunk at `pos`.
    pub fn despawn_entity(&self, pos: ChunkPos, id: EntityId) -> Result<(), RegistryError> {
        let chunk = self
            .chunk_at(pos)
            .ok_or(RegistryError::UnknownChunk(pos))?;
        let handle = chunk
            .entities
            .write()
            .unwrap()
            .shift_remove(&id)
            .ok_or(RegistryError::UnknownEntity(id))?;
        handle.owner().clear();
        Ok(())
    }

    /// Move an entity between two loaded chunks of this instance.
    ///
    /// The move is atomic with respect to membership: at no point is
    /// the entity enumerable from both chunks, and on any error the
    /// entity stays where it was. Callers must invoke this only
    /// between ticks on the worker that owns the entity; the registry
    /// does not enforce the timing.
    pub fn switch_entity_chunk(
        &self,
        id: EntityId,
        from: ChunkPos,
        to: ChunkPos,
    ) -> Result<(), RegistryError> {
        let from_chunk = self
            .chunk_at(from)
            .ok_or(RegistryError::UnknownChunk(from))?;
        let to_chunk = self.chunk_at(to).ok_or(RegistryError::UnknownChunk(to))?;

        if from == to {
            return if from_chunk.contains_entity(id) {
                Ok(())
            } else {
                Err(RegistryError::UnknownEntity(id))
            };
        }

        // Lock both membership maps in position order so two opposing
        // switches cannot deadlock.
        let mut first;
        let mut second;
        let (from_map, to_map) = if from < to {
            first = from_chunk.entities.write().unwrap();
            second = to_chunk.entities.write().unwrap();
            (&mut first, &mut second)
        } else {
            first = to_chunk.entities.write().unwrap();
            second = from_chunk.entities.write().unwrap();
            (&mut second, &mut first)
        };

        if to_map.contains_key(&id) {
            return Err(RegistryError::DuplicateEntity(id));
        }
        let handle = from_map
            .shift_remove(&id)
            .ok_or(RegistryError::UnknownEntity(id))?;
        to_map.insert(id, handle);
        Ok(())
    }
}

// ── InstanceRegistry ─────────────────────────────────────────────

/// The set of registered instances, passed by reference to the pool.
#[derive(Default)]
pub struct InstanceRegistry {
    instances: RwLock<IndexMap<InstanceId, Arc<InstanceEntry>>>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under a fresh ID.
    pub fn register_instance(&self, instance: impl Instance + 'static) -> Arc<InstanceEntry> {
        let entry = Arc::new(InstanceEntry {
            id: InstanceId::next(),
            handle: TickHandle::from_instance(instance),
            chunks: RwLock::new(IndexMap::new()),
        });
        self.instances
            .write()
            .unwrap()
            .insert(entry.id, Arc::clone(&entry));
        entry
    }

    /// Remove an instance and drop all of its chunks and entities from
    /// scheduling.
    pub fn remove_instance(&self, id: InstanceId) -> Result<(), RegistryError> {
        let entry = self
            .instances
            .write()
            .unwrap()
            .shift_remove(&id)
            .ok_or(RegistryError::UnknownInstance(id))?;
        entry.handle.owner().clear();
        for chunk in entry.chunks() {
            chunk.handle.owner().clear();
            for entity in chunk.entities() {
                entity.owner().clear();
            }
        }
        Ok(())
    }

    /// The entry for a registered instance.
    pub fn instance(&self, id: InstanceId) -> Option<Arc<InstanceEntry>> {
        self.instances.read().unwrap().get(&id).cloned()
    }

    /// Snapshot of registered instance entries, in registration order.
    pub fn instances(&self) -> Vec<Arc<InstanceEntry>> {
        self.instances.read().unwrap().values().cloned().collect()
    }

    /// Number of registered instances.
    pub fn instance_count(&self) -> usize {
        self.instances.read().unwrap().len()
    }
}
