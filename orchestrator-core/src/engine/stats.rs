//! Engine-side wrapper around the sharded counters in
//! [`crate::instance::stats`] (spec §4.9): aggregation reads and the
//! per-transition delta writes the work-item/sub-workflow lifecycle
//! methods apply.

use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::instance::{shard_for, TaskStats, TaskStatsDelta};
use crate::persistence::TransactionalStore;

/// Sums every shard for `(workflow_id, task_name, generation)` into one
/// read, what a task's [`crate::element::PolicyFn`] and
/// `getAggregatedTaskStats` both consume.
pub async fn aggregate(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
    task_name: &str,
    generation: u64,
) -> Result<TaskStats, OrchestratorError> {
    let shards = store.list_shards(workflow_id, task_name, generation).await?;
    let mut total = TaskStats::default();
    for shard in shards {
        total.add(&shard.stats);
    }
    Ok(total)
}

/// Records a new work item/sub-workflow being inserted under
/// `(workflow_id, task_name, generation)`, landing on the shard its id
/// hashes to.
pub async fn record_inserted(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
    task_name: &str,
    generation: u64,
    shard_count: u32,
    entity_id: Uuid,
) -> Result<(), OrchestratorError> {
    let shard_id = shard_for(entity_id, shard_count.max(1));
    store
        .apply_shard_delta(
            workflow_id,
            task_name,
            generation,
            shard_id,
            TaskStatsDelta::inserted(),
        )
        .await?;
    Ok(())
}

/// Records a state transition of a work item/sub-workflow already
/// tracked under this `(workflow_id, task_name, generation)`. `from` and
/// `to` are the lowercase state names `TaskStatsDelta::transition`
/// recognizes (`initialized`, `started`, `completed`, `failed`,
/// `canceled`).
pub async fn record_transition(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
    task_name: &str,
    generation: u64,
    shard_count: u32,
    entity_id: Uuid,
    from: &str,
    to: &str,
) -> Result<(), OrchestratorError> {
    let shard_id = shard_for(entity_id, shard_count.max(1));
    let delta = TaskStatsDelta::transition(from, to);
    store
        .apply_shard_delta(workflow_id, task_name, generation, shard_id, delta)
        .await?;
    Ok(())
}
