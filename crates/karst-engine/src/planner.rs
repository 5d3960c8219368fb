//! Batch planning: per-instance enumeration, cost accumulation, and
//! greedy min-load worker assignment.
//!
//! Runs single-threaded on the pool's caller each tick. Each instance
//! contributes one instance-only batch plus one batch per loaded chunk
//! (the chunk and every resident entity passing the optional filter),
//! so load spreads across workers at chunk granularity. For every
//! batch the planner picks the worker with the smallest cost counter,
//! publishes that worker into every handle's owner slot, and only then
//! pushes the batch. The publish-before-push order is what lets a
//! callback running in the same tick observe the owner through
//! [`OwnerCell::current`](crate::handle::OwnerCell::current).

use std::sync::Arc;

use karst_core::{Entity, Fault, FaultSink};

use crate::batch::{Batch, WorkItem};
use crate::config::ElementCosts;
use crate::handle::TickHandle;
use crate::registry::InstanceRegistry;
use crate::worker::{Worker, COST_FULL};

/// Predicate deciding whether an entity is ticked this tick.
pub type EntityFilter = dyn Fn(&TickHandle<dyn Entity>) -> bool + Send + Sync;

/// What one planning pass produced, for metrics.
#[derive(Clone, Debug, Default)]
pub(crate) struct PlanSummary {
    pub batches: u64,
    pub items: u64,
    pub total_cost: u64,
    pub dropped: u64,
}

/// Plan one tick: walk the registry and assign each batch to the
/// least-loaded worker.
pub(crate) fn plan_tick(
    registry: &InstanceRegistry,
    workers: &[Worker],
    costs: &ElementCosts,
    filter: Option<&Arc<EntityFilter>>,
    sink: &dyn FaultSink,
) -> PlanSummary {
    let mut summary = PlanSummary::default();

    for entry in registry.instances() {
        // The instance itself is an instance-only batch, present even
        // when no chunks are loaded.
        let mut instance_batch = Batch::new();
        instance_batch.add(WorkItem::Instance(entry.handle()), costs.instance);
        assign(instance_batch, workers, &mut summary, sink);

        // One batch per chunk: the chunk plus its resident entities.
        for chunk in entry.chunks() {
            let mut batch = Batch::new();
            batch.add(
                WorkItem::Chunk {
                    chunk: chunk.handle(),
                    instance: entry.handle(),
                },
                costs.chunk,
            );
            for entity in chunk.entities() {
                if filter.is_none_or(|f| f(&entity)) {
                    batch.add(WorkItem::Entity(entity), costs.entity);
                }
            }
            assign(batch, workers, &mut summary, sink);
        }
    }

    summary
}

/// Assign one batch: pick the cheapest worker, publish ownership for
/// every handle in the batch, then push.
fn assign(batch: Batch, workers: &[Worker], summary: &mut PlanSummary, sink: &dyn FaultSink) {
    let Some(worker) = pick_worker(workers) else {
        summary.dropped += 1;
        log::error!(
            "dropping batch of cost {}: all {} workers full",
            batch.cost(),
            workers.len()
        );
        sink.handle(Fault::BatchDropped { cost: batch.cost() });
        return;
    };

    // Publish ownership before the batch becomes runnable.
    let mailbox = worker.mailbox();
    for item in batch.items() {
        item.owner_cell().refresh(worker.index(), mailbox.clone());
    }

    summary.batches += 1;
    summary.items += batch.len() as u64;
    summary.total_cost += u64::from(batch.cost());
    let cost = batch.cost();
    if worker.push_batch(batch).is_ok() {
        worker.add_cost(cost);
    }
}

/// Greedy min-load selection: O(workers), ties to the lowest index,
/// workers carrying the full sentinel are never eligible.
fn pick_worker(workers: &[Worker]) -> Option<&Worker> {
    let mut best: Option<&Worker> = None;
    for worker in workers {
        let cost = worker.cost();
        if cost == COST_FULL {
            continue;
        }
        match best {
            Some(b) if b.cost() <= cost => {}
            _ => best = Some(worker),
        }
    }
    best
}
