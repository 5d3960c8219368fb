//! Steady-state scheduling: cost split, cadence, and tick accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use karst_core::{monotonic_nanos, ChunkPos, Entity, EntityId, LogFaultSink};
use karst_engine::{EntityFilter, InstanceRegistry, SchedulerConfig, ThreadPool, TickServer};
use karst_test_utils::{TestChunk, TestEntity, TestInstance};

fn two_worker_config() -> SchedulerConfig {
    SchedulerConfig {
        worker_count: Some(2),
        ..SchedulerConfig::default()
    }
}

/// One instance with four chunks on two workers: every tick plans five
/// batches of cost 5 and the greedy assignment lands 15 on worker 0
/// and 10 on worker 1.
#[test]
fn one_instance_four_chunks_splits_fifteen_ten() {
    let registry = Arc::new(InstanceRegistry::new());
    let instance = TestInstance::new();
    let instance_ticks = instance.counter();
    let entry = registry.register_instance(instance);
    let mut chunk_ticks = Vec::new();
    for x in 0..4 {
        let chunk = TestChunk::new(ChunkPos::new(x, 0));
        chunk_ticks.push(chunk.counter());
        entry.load_chunk(chunk).unwrap();
    }

    let pool = ThreadPool::new(&two_worker_config(), Arc::clone(&registry), Arc::new(LogFaultSink))
        .unwrap();

    for _ in 0..10 {
        pool.tick(monotonic_nanos()).unwrap();
        let metrics = pool.metrics();
        assert_eq!(metrics.last_worker_costs, vec![15, 10]);
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.ticks, 10);
    assert_eq!(metrics.catch_up_resets, 0);
    assert_eq!(metrics.batches_planned, 50);
    assert_eq!(metrics.item_failures, 0);

    assert_eq!(instance_ticks.get(), 10);
    for counter in &chunk_ticks {
        assert_eq!(counter.get(), 10);
    }
    pool.stop();
}

/// The same scenario under the realtime scheduler: ten-plus ticks at
/// 20 Hz with no catch-up reset.
#[test]
fn realtime_cadence_without_resets() {
    let registry = Arc::new(InstanceRegistry::new());
    let instance = TestInstance::new();
    let instance_ticks = instance.counter();
    let entry = registry.register_instance(instance);
    for x in 0..4 {
        entry.load_chunk(TestChunk::new(ChunkPos::new(x, 0))).unwrap();
    }

    let mut server =
        TickServer::new(&two_worker_config(), Arc::clone(&registry), Arc::new(LogFaultSink))
            .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.metrics().ticks < 10 {
        assert!(
            Instant::now() < deadline,
            "20 Hz scheduler did not reach 10 ticks in 5s"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    let report = server.shutdown();

    assert!(report.ticks >= 10);
    assert_eq!(server.metrics().catch_up_resets, 0);
    assert!(instance_ticks.get() >= 10);
}

/// The pool-level entity filter excludes entities from planning
/// without touching chunk or instance scheduling.
#[test]
fn entity_filter_applies_per_tick() {
    let registry = Arc::new(InstanceRegistry::new());
    let entry = registry.register_instance(TestInstance::new());
    let pos = ChunkPos::new(0, 0);
    entry.load_chunk(TestChunk::new(pos)).unwrap();

    let skipped_id = EntityId::next();
    let skipped = TestEntity::new(skipped_id);
    let skipped_ticks = skipped.counter();
    entry.spawn_entity(pos, skipped).unwrap();
    let ticked = TestEntity::new(EntityId::next());
    let ticked_ticks = ticked.counter();
    entry.spawn_entity(pos, ticked).unwrap();

    let pool = ThreadPool::new(&two_worker_config(), Arc::clone(&registry), Arc::new(LogFaultSink))
        .unwrap();
    let filter: Arc<EntityFilter> =
        Arc::new(move |entity| entity.element().id() != skipped_id);
    pool.set_entity_filter(Some(filter));

    pool.tick(monotonic_nanos()).unwrap();
    assert_eq!(skipped_ticks.get(), 0);
    assert_eq!(ticked_ticks.get(), 1);

    // Dropping the filter brings the entity back next tick.
    pool.set_entity_filter(None);
    pool.tick(monotonic_nanos()).unwrap();
    assert_eq!(skipped_ticks.get(), 1);
    assert_eq!(ticked_ticks.get(), 2);
    pool.stop();
}
