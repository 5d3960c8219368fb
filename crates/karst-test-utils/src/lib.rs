//! Test utilities and mock elements for Karst development.
//!
//! Provides counting implementations of the three element traits
//! ([`Instance`], [`Chunk`], [`Entity`]) with pluggable tick hooks,
//! and a [`CollectingSink`] that records faults for assertions.
//!
//! The mocks are registered as trait objects, so each exposes a
//! shareable [`TickCounter`]: clone it with
//! [`counter()`](TestEntity::counter) before handing the element to a
//! registry, then assert on [`TickCounter::get`] afterwards.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use karst_core::{
    Chunk, ChunkPos, ElementError, Entity, EntityId, Fault, FaultSink, Instance,
};

/// A tick hook: runs inside the element's tick with the tick-start
/// timestamp, and its result becomes the tick's result.
pub type TickHook = Box<dyn Fn(u64) -> Result<(), ElementError> + Send + Sync>;

fn ok_hook() -> TickHook {
    Box::new(|_| Ok(()))
}

/// Shareable tick counter. Clones observe the same count.
#[derive(Clone, Default)]
pub struct TickCounter(Arc<AtomicU64>);

impl TickCounter {
    /// Number of ticks recorded so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counting [`Instance`] with an optional tick hook.
pub struct TestInstance {
    counter: TickCounter,
    hook: TickHook,
}

impl TestInstance {
    pub fn new() -> Self {
        Self::with_hook(ok_hook())
    }

    /// Run `hook` on every tick; its result is the tick's result.
    pub fn with_hook(hook: TickHook) -> Self {
        Self {
            counter: TickCounter::default(),
            hook,
        }
    }

    /// A counter clone that stays valid after the instance is
    /// registered as a trait object.
    pub fn counter(&self) -> TickCounter {
        self.counter.clone()
    }

    /// Number of times this instance has been ticked.
    pub fn ticks(&self) -> u64 {
        self.counter.get()
    }
}

impl Default for TestInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl Instance for TestInstance {
    fn tick(&self, now: u64) -> Result<(), ElementError> {
        self.counter.increment();
        (self.hook)(now)
    }
}

/// Counting [`Chunk`] with an optional tick hook.
pub struct TestChunk {
    position: ChunkPos,
    counter: TickCounter,
    hook: TickHook,
}

impl TestChunk {
    pub fn new(position: ChunkPos) -> Self {
        Self::with_hook(position, ok_hook())
    }

    pub fn with_hook(position: ChunkPos, hook: TickHook) -> Self {
        Self {
            position,
            counter: TickCounter::default(),
            hook,
        }
    }

    pub fn counter(&self) -> TickCounter {
        self.counter.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.counter.get()
    }
}

impl Chunk for TestChunk {
    fn position(&self) -> ChunkPos {
        self.position
    }

    fn tick(&self, now: u64, _instance: &dyn Instance) -> Result<(), ElementError> {
        self.counter.increment();
        (self.hook)(now)
    }
}

/// Counting [`Entity`] with an optional tick hook.
pub struct TestEntity {
    id: EntityId,
    counter: TickCounter,
    hook: TickHook,
}

impl TestEntity {
    pub fn new(id: EntityId) -> Self {
        Self::with_hook(id, ok_hook())
    }

    pub fn with_hook(id: EntityId, hook: TickHook) -> Self {
        Self {
            id,
            counter: TickCounter::default(),
            hook,
        }
    }

    /// An entity whose every tick fails with the given reason.
    pub fn failing(id: EntityId, reason: &str) -> Self {
        let reason = reason.to_string();
        Self::with_hook(
            id,
            Box::new(move |_| {
                Err(ElementError::ExecutionFailed {
                    reason: reason.clone(),
                })
            }),
        )
    }

    pub fn counter(&self) -> TickCounter {
        self.counter.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.counter.get()
    }
}

impl Entity for TestEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn tick(&self, now: u64) -> Result<(), ElementError> {
        self.counter.increment();
        (self.hook)(now)
    }
}

/// Fault sink that records everything it receives.
#[derive(Default)]
pub struct CollectingSink {
    faults: Mutex<Vec<Fault>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of faults recorded so far.
    pub fn len(&self) -> usize {
        self.faults.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain and return the recorded faults.
    pub fn take(&self) -> Vec<Fault> {
        std::mem::take(&mut self.faults.lock().unwrap())
    }
}

impl FaultSink for CollectingSink {
    fn handle(&self, fault: Fault) {
        self.faults.lock().unwrap().push(fault);
    }
}
