//! Task enablement and firing (spec §4.2): the join/split state machine
//! that drives a [`crate::instance::TaskInstance`] through
//! `disabled -> enabled -> started -> (completed|failed|canceled)`,
//! re-enabling at a new `generation` when the net loops back.

use serde_json::Value;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::element::{SplitType, TaskDefinition, TaskKind, WorkflowDefinition};
use crate::error::OrchestratorError;
use crate::instance::TaskState;

use super::core::Engine;

impl Engine {
    /// Checks `task_name`'s join condition against the current marking
    /// and, if satisfied, fires the enablement sequence: consume incoming
    /// tokens, bump `generation`, transition to `enabled`, run `onEnabled`,
    /// then auto-fire dummy tasks straight through to `completed`.
    pub(crate) async fn try_enable_task(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
    ) -> Result<bool, OrchestratorError> {
        let task = self.store.get_task(workflow_id, task_name).await?;
        if !matches!(task.state, TaskState::Disabled) {
            // Already enabled/started/terminal this generation: re-firing
            // is driven by a later re-enablement, not by this call.
            return Ok(false);
        }

        let (enabled, consumes) = super::net::evaluate_join(&*self.store, def, workflow_id, task_name).await?;
        if !enabled {
            return Ok(false);
        }

        for condition_name in &consumes {
            super::net::consume_condition(&*self.store, workflow_id, condition_name).await?;
        }

        let generation = task.generation + 1;
        let mut task = task;
        task.generation = generation;
        task.state = TaskState::Enabled;
        task.realized_path.clear();
        self.store.replace_task(task.clone()).await?;

        let task_def = def.task(task_name)?;
        self.run_task_activity(ctx, task_def, workflow_id, task_name, generation, "onEnabled", Value::Null)
            .await?;

        if matches!(task_def.kind, TaskKind::Dummy) {
            self.start_task(ctx, def, workflow_id, task_name).await?;
            self.complete_task(ctx, def, workflow_id, task_name).await?;
        }

        Ok(true)
    }

    /// Re-evaluates every still-`enabled` task's join: used after a
    /// deposit (new incoming token may satisfy an `and`/`xor`/`or` join)
    /// or after a cancellation-region pass kills a path an `or` join was
    /// waiting on.
    pub(crate) async fn enable_downstream_of_condition(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        condition_name: &str,
    ) -> Result<(), OrchestratorError> {
        for task_name in def.condition_successors(condition_name) {
            self.try_enable_task(ctx, def, workflow_id, task_name).await?;
        }
        Ok(())
    }

    /// Re-checks every task with an `or` join still `disabled`, since a
    /// completion or cancellation elsewhere in the net can flip an
    /// OR-join's E2WFOJNet verdict without a new token landing on one of
    /// its own incoming conditions (spec §4.8, evaluated "whenever ... a
    /// task with an OR-join completes").
    pub(crate) async fn reevaluate_or_joins(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
    ) -> Result<(), OrchestratorError> {
        let or_join_tasks: Vec<&str> = def
            .tasks
            .values()
            .filter(|t| matches!(t.join_type, crate::element::JoinType::Or))
            .map(|t| t.name.as_str())
            .collect();
        for task_name in or_join_tasks {
            self.try_enable_task(ctx, def, workflow_id, task_name).await?;
        }
        Ok(())
    }

    /// Transitions `enabled -> started` the first time one of the task's
    /// children (work item or sub-workflow) itself starts (spec §4.2 step
    /// 3). A no-op once the task is already `started` or beyond.
    pub(crate) async fn start_task(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
    ) -> Result<(), OrchestratorError> {
        let mut task = self.store.get_task(workflow_id, task_name).await?;
        if !matches!(task.state, TaskState::Enabled) {
            return Ok(());
        }
        task.state = TaskState::Started;
        self.store.replace_task(task.clone()).await?;
        let task_def = def.task(task_name)?;
        self.run_task_activity(
            ctx,
            task_def,
            workflow_id,
            task_name,
            task.generation,
            "onStarted",
            Value::Null,
        )
        .await
    }

    /// Full completion sequence (spec §4.2 step 4): cancel outstanding
    /// children of this generation, cancel this task's scheduled entries,
    /// transition to `completed`, run `onCompleted`, release the task's
    /// own cancellation region, apply the split to deposit tokens, then
    /// re-evaluate enablement (including OR-joins, since this completion
    /// may have just killed a dead path) before checking whether the
    /// workflow itself can now complete.
    pub(crate) async fn complete_task(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
    ) -> Result<(), OrchestratorError> {
        let task = self.store.get_task(workflow_id, task_name).await?;
        if task.state.is_terminal() {
            return Ok(());
        }
        let generation = task.generation;

        self.cancel_active_children(ctx, def, workflow_id, task_name, generation).await?;
        self.scheduler.cancel_for_task(workflow_id, task_name).await?;

        let task_def = def.task(task_name)?;
        let mut task = task;
        task.state = TaskState::Completed;
        self.store.replace_task(task.clone()).await?;
        self.run_task_activity(ctx, task_def, workflow_id, task_name, generation, "onCompleted", Value::Null)
            .await?;

        self.apply_cancellation_region(ctx, def, workflow_id, task_name).await?;

        let routed = self.route_split(ctx, def, task_def, workflow_id, generation).await?;
        let split_eval = crate::marking::evaluate_split(def, task_name, task_def.split_type, &routed);

        let mut task = self.store.get_task(workflow_id, task_name).await?;
        task.realized_path = split_eval.deposits.clone();
        self.store.replace_task(task).await?;

        for condition_name in &split_eval.deposits {
            super::net::deposit_condition(&*self.store, workflow_id, condition_name).await?;
        }
        for condition_name in &split_eval.deposits {
            self.enable_downstream_of_condition(ctx, def, workflow_id, condition_name).await?;
        }
        self.reevaluate_or_joins(ctx, def, workflow_id).await?;
        self.maybe_complete_workflow(ctx, def, workflow_id).await?;
        Ok(())
    }

    /// Computes the successors an `xor`/`or` split's `route` callback
    /// chooses, validating arity against the declared split type (spec
    /// §4.2). `and` splits never consult `route`.
    async fn route_split(
        &self,
        _ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        task_def: &TaskDefinition,
        workflow_id: Uuid,
        generation: u64,
    ) -> Result<Vec<String>, OrchestratorError> {
        if matches!(task_def.split_type, SplitType::And) {
            return Ok(Vec::new());
        }
        let candidates = crate::marking::task_condition_successors(def, &task_def.name);
        let route = task_def.route.clone().ok_or_else(|| {
            OrchestratorError::StructuralIntegrity(crate::element::BuilderError::MissingRouteFunction(
                task_def.name.clone(),
            ))
        })?;
        let workflow = self.store.get_workflow(workflow_id).await?;
        let input = crate::element::RouteInput {
            workflow_id,
            task_name: &task_def.name,
            generation,
            payload: &workflow.payload,
            candidates: &candidates,
        };
        let chosen = route(input);

        match task_def.split_type {
            SplitType::Xor if chosen.len() != 1 => Err(OrchestratorError::ConstraintViolation(format!(
                "xor split '{}' route returned {} successors, expected exactly 1",
                task_def.name,
                chosen.len()
            ))),
            SplitType::Or if chosen.is_empty() => Err(OrchestratorError::ConstraintViolation(format!(
                "or split '{}' route returned no successors",
                task_def.name
            ))),
            _ => Ok(chosen),
        }
    }

    /// Cancels every non-finalized work item/sub-workflow owned by
    /// `task_name`'s current `generation`, without notifying the task's
    /// own policy (the caller — `complete_task`/`cancel_task` — is
    /// already driving that task's transition).
    pub(crate) async fn cancel_active_children(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<(), OrchestratorError> {
        let task_def = def.task(task_name)?;
        match &task_def.kind {
            TaskKind::Atomic(_) => {
                let items = self
                    .store
                    .list_work_items_by_parent(workflow_id, task_name, generation)
                    .await?;
                for item in items {
                    if !item.state.is_terminal() {
                        self.cancel_work_item_internal(ctx, item.id, Value::Null, false).await?;
                    }
                }
            }
            TaskKind::Composite(_) | TaskKind::DynamicComposite(_) => {
                let subs = self
                    .store
                    .list_sub_workflows_by_parent(workflow_id, task_name, generation)
                    .await?;
                for sub in subs {
                    if !sub.state.is_terminal() {
                        self.cancel_workflow_internal(
                            ctx,
                            sub.workflow_id,
                            crate::instance::CancelReason::Teardown,
                            Value::Null,
                            false,
                        )
                        .await?;
                    }
                }
            }
            TaskKind::Dummy => {}
        }
        Ok(())
    }

    /// Cancellation-region propagation (spec §4.6): clears every token
    /// from the region's conditions and force-cancels every listed task's
    /// current-generation instance, without invoking those tasks'
    /// policies — the cancellation is external to them.
    pub(crate) async fn apply_cancellation_region(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
    ) -> Result<(), OrchestratorError> {
        let Some(region) = def.cancellation_regions.get(task_name) else {
            return Ok(());
        };
        for condition_name in &region.conditions {
            super::net::clear_condition(&*self.store, workflow_id, condition_name).await?;
        }
        for target_task in &region.tasks {
            self.cancel_task(ctx, def, workflow_id, target_task).await?;
        }
        Ok(())
    }

    /// Force-cancels `task_name`'s current-generation instance: cancels
    /// its active children and scheduled entries, transitions to
    /// `canceled`, runs `onCanceled`, and releases its own cancellation
    /// region (spec §4.6 applies on completion *or* cancellation). A
    /// no-op on an already-terminal task (idempotence, spec §8 L1's
    /// sibling law for tasks).
    pub(crate) async fn cancel_task(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
    ) -> Result<(), OrchestratorError> {
        let task = self.store.get_task(workflow_id, task_name).await?;
        if task.state.is_terminal() {
            return Ok(());
        }
        let generation = task.generation;

        self.cancel_active_children(ctx, def, workflow_id, task_name, generation).await?;
        self.scheduler.cancel_for_task(workflow_id, task_name).await?;

        let task_def = def.task(task_name)?;
        let mut task = task;
        task.state = TaskState::Canceled;
        self.store.replace_task(task.clone()).await?;
        self.run_task_activity(ctx, task_def, workflow_id, task_name, generation, "onCanceled", Value::Null)
            .await?;

        self.apply_cancellation_region(ctx, def, workflow_id, task_name).await?;
        self.reevaluate_or_joins(ctx, def, workflow_id).await?;
        Ok(())
    }

    /// Force-fails `task_name`'s current-generation instance and
    /// propagates the failure to the owning workflow (spec §4.7 `fail`:
    /// "same shape as cancel but labeled as failure").
    pub(crate) async fn fail_task(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
    ) -> Result<(), OrchestratorError> {
        let task = self.store.get_task(workflow_id, task_name).await?;
        if task.state.is_terminal() {
            return Ok(());
        }
        let generation = task.generation;

        self.cancel_active_children(ctx, def, workflow_id, task_name, generation).await?;
        self.scheduler.cancel_for_task(workflow_id, task_name).await?;

        let task_def = def.task(task_name)?;
        let mut task = task;
        task.state = TaskState::Failed;
        self.store.replace_task(task.clone()).await?;
        self.run_task_activity(ctx, task_def, workflow_id, task_name, generation, "onFailed", Value::Null)
            .await?;

        self.fail_workflow(ctx, def, workflow_id).await?;
        Ok(())
    }
}
