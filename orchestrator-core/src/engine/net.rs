//! The impure shell around [`crate::marking`] and [`crate::orjoin`]:
//! loads a [`Marking`] from persisted [`crate::instance::ConditionInstance`]
//! rows, applies deposits/consumes back through the store, and computes
//! the `dead_tasks` set the OR-join analysis needs to account for
//! cancellation (spec §4.8: "completion can kill a path that was
//! expected to contribute").

use std::collections::HashSet;

use uuid::Uuid;

use crate::element::WorkflowDefinition;
use crate::error::OrchestratorError;
use crate::instance::TaskState;
use crate::marking::Marking;
use crate::persistence::TransactionalStore;

pub async fn load_marking(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
) -> Result<Marking, OrchestratorError> {
    let conditions = store.list_conditions(workflow_id).await?;
    Ok(Marking::from_tokens(
        conditions.into_iter().map(|c| (c.name, c.marking)),
    ))
}

/// Tasks whose current generation is `canceled`/`failed` and therefore
/// can never deposit a fresh token: the set [`crate::orjoin::evaluate_or_join`]
/// must treat as permanently inactivable.
pub async fn dead_tasks(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
) -> Result<HashSet<String>, OrchestratorError> {
    let mut dead = HashSet::new();
    for state in [TaskState::Canceled, TaskState::Failed] {
        for task in store.list_tasks_by_state(workflow_id, state).await? {
            dead.insert(task.name);
        }
    }
    Ok(dead)
}

pub async fn deposit_condition(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
    condition_name: &str,
) -> Result<(), OrchestratorError> {
    let condition = store.get_condition(workflow_id, condition_name).await?;
    store
        .set_condition_marking(workflow_id, condition_name, condition.marking + 1)
        .await?;
    Ok(())
}

pub async fn consume_condition(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
    condition_name: &str,
) -> Result<(), OrchestratorError> {
    let condition = store.get_condition(workflow_id, condition_name).await?;
    store
        .set_condition_marking(workflow_id, condition_name, condition.marking.saturating_sub(1))
        .await?;
    Ok(())
}

/// Removes *every* token from `condition_name` (spec §4.6: cancellation
/// region firing "removes all tokens from the listed conditions", not
/// just one).
pub async fn clear_condition(
    store: &dyn TransactionalStore,
    workflow_id: Uuid,
    condition_name: &str,
) -> Result<(), OrchestratorError> {
    store.set_condition_marking(workflow_id, condition_name, 0).await?;
    Ok(())
}

/// Evaluates whether `task_name`'s join is satisfied, handling `or` joins
/// through the E2WFOJNet analysis and `and`/`xor` directly against the
/// marking. Returns the incoming conditions to consume once the task
/// actually fires.
pub async fn evaluate_join(
    store: &dyn TransactionalStore,
    def: &WorkflowDefinition,
    workflow_id: Uuid,
    task_name: &str,
) -> Result<(bool, Vec<String>), OrchestratorError> {
    let task_def = def.task(task_name)?;
    let marking = load_marking(store, workflow_id).await?;

    match task_def.join_type {
        crate::element::JoinType::Or => {
            let dead = dead_tasks(store, workflow_id).await?;
            let enabled = crate::orjoin::evaluate_or_join(def, task_name, &marking, &dead);
            let consumes = if enabled {
                crate::marking::or_join_consumes(def, task_name, &marking)
            } else {
                Vec::new()
            };
            Ok((enabled, consumes))
        }
        join_type => {
            let evaluation = crate::marking::evaluate_direct_join(def, task_name, join_type, &marking);
            Ok((evaluation.enabled, evaluation.consumes))
        }
    }
}
