//! Minimal realtime server: a small world ticking at 20 Hz for two
//! seconds, with metrics printed at the end.
//!
//! Run with `RUST_LOG=debug cargo run --example realtime` to watch the
//! worker and scheduler lifecycle.

use std::sync::Arc;
use std::time::Duration;

use karst_core::{ChunkPos, EntityId, LogFaultSink};
use karst_engine::{InstanceRegistry, SchedulerConfig, TickServer};
use karst_test_utils::{TestChunk, TestEntity, TestInstance};

fn main() {
    env_logger::init();

    let registry = Arc::new(InstanceRegistry::new());
    let entry = registry.register_instance(TestInstance::new());
    for x in -2..=2 {
        for z in -2..=2 {
            let pos = ChunkPos::new(x, z);
            entry.load_chunk(TestChunk::new(pos)).expect("fresh chunk");
            entry
                .spawn_entity(pos, TestEntity::new(EntityId::next()))
                .expect("chunk loaded");
        }
    }

    let config = SchedulerConfig::default();
    let mut server =
        TickServer::new(&config, registry, Arc::new(LogFaultSink)).expect("server start");

    std::thread::sleep(Duration::from_secs(2));
    let report = server.shutdown();

    let metrics = server.metrics();
    println!("ticks run:        {}", report.ticks);
    println!("batches planned:  {}", metrics.batches_planned);
    println!("items executed:   {}", metrics.items_executed);
    println!("catch-up resets:  {}", metrics.catch_up_resets);
    println!("last tick:        {} us", metrics.last_tick_us);
    println!("workers joined:   {}", report.workers_joined);
}
