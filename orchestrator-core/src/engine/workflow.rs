//! Root and sub-workflow lifecycle (spec §4.7): instance creation, the
//! `ensureStarted` cascade up a composite task's parent chain, workflow
//! completion/cancellation/failure, and keeping a sub-workflow's
//! [`SubWorkflowInstance`] join row in sync with its own
//! [`WorkflowInstance`] row on every transition.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::context::{ExecutionContext, ExecutionMode, WorkflowCallbackContext};
use crate::element::{PolicyTransition, WorkflowDefinition, WorkflowVersion};
use crate::error::OrchestratorError;
use crate::instance::{
    AuditContext, CancelReason, ConditionInstance, SubWorkflowInstance, SubWorkflowState,
    TaskInstance, TaskState, WorkflowInstance, WorkflowParent, WorkflowState,
};
use crate::persistence::WorkflowPatch;

use super::core::Engine;

impl Engine {
    /// Inserts the condition/task rows a freshly-created instance needs
    /// and marks its start condition. Fast-forward migration seeds its
    /// own marking through the task migrators instead, so the start
    /// condition is left unmarked in that mode.
    async fn seed_instance_rows(
        &self,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        execution_mode: ExecutionMode,
    ) -> Result<(), OrchestratorError> {
        for condition_def in def.conditions.values() {
            let mut condition = ConditionInstance::new(workflow_id, condition_def.name.clone());
            if matches!(execution_mode, ExecutionMode::Normal)
                && condition_def.name == def.start_condition_name
            {
                condition.marking = 1;
            }
            self.store.insert_condition(condition).await?;
        }
        for task_def in def.tasks.values() {
            self.store
                .insert_task(TaskInstance::new(workflow_id, task_def.name.clone()))
                .await?;
        }
        Ok(())
    }

    /// Runs one of a workflow's [`crate::element::WorkflowActivities`]
    /// callbacks by lifecycle point name, defaulting to no-op (spec §4.7,
    /// mirroring [`Engine::run_task_activity`] for the workflow itself).
    pub(crate) async fn run_workflow_activity(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        point: &str,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let callback = match point {
            "onInitialized" => def.activities.on_initialized.as_ref(),
            "onStarted" => def.activities.on_started.as_ref(),
            "onCompleted" => def.activities.on_completed.as_ref(),
            "onCanceled" => def.activities.on_canceled.as_ref(),
            "onFailed" => def.activities.on_failed.as_ref(),
            _ => None,
        };
        let Some(callback) = callback else { return Ok(()) };
        let callback = callback.clone();
        let callback_ctx = WorkflowCallbackContext {
            exec: ctx.clone(),
            workflow_id,
            payload,
        };
        let trace_id = self.trace_id_for(workflow_id).await?;
        ctx.with_span(&trace_id, point, "workflow", &def.name, move |child_ctx| {
            let mut callback_ctx = callback_ctx;
            callback_ctx.exec = child_ctx;
            async move { callback(callback_ctx).await }
        })
        .await
    }

    /// Fires a parent task's `onWorkflowStateChanged` hook for one of its
    /// owned sub-workflows (mirrors [`Engine::notify_work_item_state_changed`]).
    async fn notify_workflow_state_changed(
        &self,
        ctx: &ExecutionContext,
        parent_def: &WorkflowDefinition,
        parent: &WorkflowParent,
        child_workflow_id: Uuid,
        from: Value,
        to: &str,
    ) -> Result<(), OrchestratorError> {
        let task_def = parent_def.task(&parent.task_name)?;
        self.run_task_activity(
            ctx,
            task_def,
            parent.workflow_id,
            &parent.task_name,
            parent.task_generation,
            "onWorkflowStateChanged",
            serde_json::json!({ "workflowId": child_workflow_id, "from": from, "to": to }),
        )
        .await
    }

    /// Replaces `workflow_id`'s [`SubWorkflowInstance`] join row state,
    /// keeping it in lockstep with the canonical [`WorkflowInstance`] row
    /// the transition just landed on.
    async fn sync_sub_workflow_state(
        &self,
        workflow_id: Uuid,
        state: SubWorkflowState,
    ) -> Result<(), OrchestratorError> {
        let mut sub = self.store.get_sub_workflow(workflow_id).await?;
        sub.state = state;
        sub.updated_at = Utc::now();
        self.store.replace_sub_workflow(sub).await?;
        Ok(())
    }

    /// Shared instance-creation sequence for both a root workflow and a
    /// sub-workflow (spec §4.7): insert the row, seed its net, persist an
    /// audit context, run `onInitialized`, enable whatever the start
    /// condition reaches, then ensure the instance is started.
    pub(crate) async fn initialize_workflow_logic(
        &self,
        ctx: &ExecutionContext,
        def: &Arc<WorkflowDefinition>,
        workflow_id: Uuid,
        parent: Option<WorkflowParent>,
        realized_path: Vec<Uuid>,
        payload: Value,
        audit_seed: AuditContext,
    ) -> Result<(), OrchestratorError> {
        let now = Utc::now();
        let workflow = WorkflowInstance {
            id: workflow_id,
            workflow_name: def.name.clone(),
            version_name: def.version_name.clone(),
            parent,
            state: WorkflowState::Initialized,
            realized_path,
            execution_mode: ctx.execution_mode,
            payload: payload.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_workflow(workflow).await?;
        self.seed_instance_rows(def, workflow_id, ctx.execution_mode).await?;
        ctx.audit.persist_context(audit_seed).await?;

        if !matches!(ctx.execution_mode, ExecutionMode::FastForward) {
            self.run_workflow_activity(ctx, def, workflow_id, "onInitialized", payload).await?;
        }

        self.enable_downstream_of_condition(ctx, def, workflow_id, &def.start_condition_name)
            .await?;
        self.ensure_workflow_started(ctx, workflow_id).await
    }

    /// `initialized -> started` (spec §4.7 `ensureStarted`): idempotent —
    /// a no-op once the workflow is already started or terminal — and,
    /// for a sub-workflow, cascades up through the owning task (which
    /// itself transitions `enabled -> started`) and then up through that
    /// task's own workflow, so a deeply-nested composite chain all
    /// reports `started` together within the same mutation.
    pub(crate) fn ensure_workflow_started<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        workflow_id: Uuid,
    ) -> BoxFuture<'a, Result<(), OrchestratorError>> {
        Box::pin(async move {
            let workflow = self.store.get_workflow(workflow_id).await?;
            if !matches!(workflow.state, WorkflowState::Initialized) {
                return Ok(());
            }

            let def = self.definition_for_workflow(workflow_id).await?;
            self.store
                .patch_workflow(
                    workflow_id,
                    WorkflowPatch {
                        state: Some(WorkflowState::Started),
                        payload: None,
                    },
                )
                .await?;
            if !matches!(ctx.execution_mode, ExecutionMode::FastForward) {
                self.run_workflow_activity(ctx, &def, workflow_id, "onStarted", Value::Null)
                    .await?;
            }

            let Some(parent) = workflow.parent.clone() else {
                return Ok(());
            };

            self.sync_sub_workflow_state(workflow_id, SubWorkflowState::Started).await?;
            let parent_def = self.definition_for_workflow(parent.workflow_id).await?;
            let parent_task_def = parent_def.task(&parent.task_name)?;
            super::stats::record_transition(
                &*self.store,
                parent.workflow_id,
                &parent.task_name,
                parent.task_generation,
                parent_task_def.stats_shard_count,
                workflow_id,
                "initialized",
                "started",
            )
            .await?;

            self.start_task(ctx, &parent_def, parent.workflow_id, &parent.task_name).await?;
            self.notify_workflow_state_changed(
                ctx,
                &parent_def,
                &parent,
                workflow_id,
                Value::String("initialized".to_string()),
                "started",
            )
            .await?;
            self.apply_task_policy(
                ctx,
                &parent_def,
                parent.workflow_id,
                &parent.task_name,
                parent.task_generation,
                PolicyTransition {
                    prev_state: "initialized".to_string(),
                    next_state: "started".to_string(),
                },
            )
            .await?;

            self.ensure_workflow_started(ctx, parent.workflow_id).await
        })
    }

    /// Creates a new root workflow instance from a registered version and
    /// drives it through initialization (spec §6 `initializeRootWorkflow`).
    pub async fn initialize_root_workflow(
        self: &Arc<Self>,
        version: WorkflowVersion,
        payload: Value,
    ) -> Result<Uuid, OrchestratorError> {
        let def = self.registry.get(&version)?;
        let ctx = self.new_root_context(ExecutionMode::Normal);
        let workflow_id = Uuid::now_v7();
        let audit_seed = AuditContext::root(workflow_id, workflow_id.to_string());

        self.initialize_workflow_logic(&ctx, &def, workflow_id, None, Vec::new(), payload, audit_seed)
            .await?;
        self.drain_auto_trigger_queue(&ctx).await?;
        Ok(workflow_id)
    }

    /// Creates a sub-workflow owned by a composite/dynamic-composite
    /// task's current generation, used by
    /// [`crate::context::EngineHandle::initialize_sub_workflow`] — called
    /// inline from within that task's `onEnabled` callback, never queued
    /// (spec §4.7: the child id is available to the caller immediately).
    /// `child_name` selects the variant for a dynamic composite task and
    /// is ignored (must be empty) for a plain composite task.
    pub(crate) async fn initialize_sub_workflow_logic(
        &self,
        ctx: &ExecutionContext,
        parent_workflow_id: Uuid,
        parent_task_name: &str,
        child_name: &str,
        payload: Value,
    ) -> Result<Uuid, OrchestratorError> {
        let parent_def = self.definition_for_workflow(parent_workflow_id).await?;
        let parent_task_def = parent_def.task(parent_task_name)?;
        let variant = if child_name.is_empty() { None } else { Some(child_name) };
        let embedded = parent_task_def.child_definition(variant).ok_or_else(|| {
            OrchestratorError::ConstraintViolation(format!(
                "task '{parent_task_name}' has no child workflow definition named '{child_name}'"
            ))
        })?;
        // The embedded definition only names the child's (workflowName,
        // versionName); the child runs as its own registry-resolved
        // instance so `definition_for_workflow` keeps working uniformly
        // for every workflow instance regardless of nesting.
        let child_def = self.registry.get_by_name(&embedded.name, &embedded.version_name)?;

        let parent_task = self.store.get_task(parent_workflow_id, parent_task_name).await?;
        let generation = parent_task.generation;

        self.run_action(
            ctx,
            parent_task_def.instantiation_action.as_ref(),
            parent_workflow_id,
            parent_task_name,
            generation,
            "initializeChild",
            &payload,
        )
        .await?;

        let parent_workflow = self.store.get_workflow(parent_workflow_id).await?;
        let mut realized_path = parent_workflow.realized_path.clone();
        realized_path.push(parent_workflow_id);

        let workflow_id = Uuid::now_v7();
        let parent = WorkflowParent {
            workflow_id: parent_workflow_id,
            task_name: parent_task_name.to_string(),
            task_generation: generation,
        };

        let now = Utc::now();
        self.store
            .insert_sub_workflow(SubWorkflowInstance::new(
                workflow_id,
                parent.clone(),
                child_def.name.clone(),
                child_def.version_name.clone(),
                now,
            ))
            .await?;
        super::stats::record_inserted(
            &*self.store,
            parent_workflow_id,
            parent_task_name,
            generation,
            parent_task_def.stats_shard_count,
            workflow_id,
        )
        .await?;
        self.notify_workflow_state_changed(
            ctx,
            &parent_def,
            &parent,
            workflow_id,
            Value::Null,
            "initialized",
        )
        .await?;

        let parent_audit = ctx
            .audit
            .load_context(parent_workflow_id)
            .await?
            .unwrap_or_else(|| AuditContext::root(parent_workflow_id, parent_workflow_id.to_string()));
        let audit_seed = parent_audit.child(
            workflow_id,
            ctx.current_span_id.clone().unwrap_or_default(),
            parent_task_name,
        );

        self.initialize_workflow_logic(ctx, &child_def, workflow_id, Some(parent), realized_path, payload, audit_seed)
            .await?;

        Ok(workflow_id)
    }

    /// Checks whether `workflow_id`'s end condition now carries a token
    /// and, if so, completes it (spec §4.7: completion is driven by the
    /// net reaching its end condition, not by an explicit call). A no-op
    /// while the net still has work outstanding.
    pub(crate) async fn maybe_complete_workflow(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
    ) -> Result<(), OrchestratorError> {
        let workflow = self.store.get_workflow(workflow_id).await?;
        if workflow.state.is_terminal() {
            return Ok(());
        }
        let marking = super::net::load_marking(&*self.store, workflow_id).await?;
        if !marking.is_marked(&def.end_condition_name) {
            return Ok(());
        }
        self.complete_workflow(ctx, def, workflow_id, workflow).await
    }

    /// Full completion sequence: cancel whatever is still active (an
    /// `or`-split net can reach the end condition while a sibling branch
    /// is still running), release scheduled entries, transition to
    /// `completed`, run `onCompleted`, flush the audit trace, and — for a
    /// sub-workflow — sync the join row and drive the owning task's
    /// policy forward.
    async fn complete_workflow(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        workflow: WorkflowInstance,
    ) -> Result<(), OrchestratorError> {
        self.cancel_active_tasks(ctx, def, workflow_id).await?;
        self.scheduler.cancel_for_workflow(workflow_id).await?;

        self.store
            .patch_workflow(
                workflow_id,
                WorkflowPatch {
                    state: Some(WorkflowState::Completed),
                    payload: None,
                },
            )
            .await?;
        self.run_workflow_activity(ctx, def, workflow_id, "onCompleted", Value::Null).await?;
        let trace_id = self.trace_id_for(workflow_id).await?;
        self.audit.flush(&trace_id).await;

        self.propagate_to_parent(ctx, &workflow, SubWorkflowState::Completed, "completed", true)
            .await
    }

    /// Explicit, host-initiated cancellation of a root workflow (spec §6
    /// `cancelRootWorkflow`): always `reason = explicit`, so a declared
    /// `cancel_action` runs.
    pub async fn cancel_root_workflow(
        self: &Arc<Self>,
        workflow_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let ctx = self.new_root_context(ExecutionMode::Normal);
        self.cancel_workflow_internal(&ctx, workflow_id, CancelReason::Explicit, payload, true)
            .await?;
        self.drain_auto_trigger_queue(&ctx).await
    }

    /// Explicit, host-initiated cancellation of a descendant workflow
    /// below some composite task (spec §6 `cancelWorkflow`).
    pub async fn cancel_workflow(
        self: &Arc<Self>,
        workflow_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        self.cancel_root_workflow(workflow_id, payload).await
    }

    /// Force-cancellation, explicit or cascaded (spec §4.7/§4.6). A
    /// no-op on an already-terminal instance. `notify_parent_policy`
    /// lets a cancellation-region/parent-teardown cascade suppress the
    /// owning task's policy evaluation, the same `callPolicy = false`
    /// shape [`Engine::cancel_work_item_internal`] uses.
    pub(crate) async fn cancel_workflow_internal(
        &self,
        ctx: &ExecutionContext,
        workflow_id: Uuid,
        reason: CancelReason,
        payload: Value,
        notify_parent_policy: bool,
    ) -> Result<(), OrchestratorError> {
        let workflow = self.store.get_workflow(workflow_id).await?;
        if workflow.state.is_terminal() {
            return Ok(());
        }
        let def = self.definition_for_workflow(workflow_id).await?;

        self.cancel_active_tasks(ctx, &def, workflow_id).await?;
        self.scheduler.cancel_for_workflow(workflow_id).await?;

        if matches!(reason, CancelReason::Explicit) {
            self.run_action(
                ctx,
                def.cancel_action.as_ref(),
                workflow_id,
                "",
                0,
                "cancel",
                &payload,
            )
            .await?;
        }

        self.store
            .patch_workflow(
                workflow_id,
                WorkflowPatch {
                    state: Some(WorkflowState::Canceled),
                    payload: None,
                },
            )
            .await?;
        self.run_workflow_activity(ctx, &def, workflow_id, "onCanceled", payload).await?;
        let trace_id = self.trace_id_for(workflow_id).await?;
        self.audit.flush(&trace_id).await;

        self.propagate_to_parent(ctx, &workflow, SubWorkflowState::Canceled, "canceled", notify_parent_policy)
            .await
    }

    /// Propagates a terminal sub-workflow transition up to its owning
    /// task: syncs the join row, records the stats transition, and fires
    /// `onWorkflowStateChanged`. `notify_policy` additionally evaluates
    /// the owning task's policy — suppressed when the transition is
    /// externally forced (a cancellation-region/parent-teardown cascade,
    /// spec §4.6's `callPolicy = false`). A no-op for a root workflow (no
    /// parent to propagate to).
    async fn propagate_to_parent(
        &self,
        ctx: &ExecutionContext,
        workflow: &WorkflowInstance,
        sub_state: SubWorkflowState,
        to: &str,
        notify_policy: bool,
    ) -> Result<(), OrchestratorError> {
        let Some(parent) = workflow.parent.clone() else {
            return Ok(());
        };
        self.sync_sub_workflow_state(workflow.id, sub_state).await?;
        let parent_def = self.definition_for_workflow(parent.workflow_id).await?;
        super::stats::record_transition(
            &*self.store,
            parent.workflow_id,
            &parent.task_name,
            parent.task_generation,
            parent_def.task(&parent.task_name)?.stats_shard_count,
            workflow.id,
            "started",
            to,
        )
        .await?;
        self.notify_workflow_state_changed(
            ctx,
            &parent_def,
            &parent,
            workflow.id,
            Value::String("started".to_string()),
            to,
        )
        .await?;
        if !notify_policy {
            return Ok(());
        }
        self.apply_task_policy(
            ctx,
            &parent_def,
            parent.workflow_id,
            &parent.task_name,
            parent.task_generation,
            PolicyTransition {
                prev_state: "started".to_string(),
                next_state: to.to_string(),
            },
        )
        .await
    }

    /// Cancels every non-terminal task instance of `workflow_id`,
    /// releasing whatever the net still has in flight at completion or
    /// cancellation time (e.g. a sibling branch of an `or` split that
    /// never reached this workflow's end condition).
    async fn cancel_active_tasks(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
    ) -> Result<(), OrchestratorError> {
        for task in self.store.list_tasks(workflow_id).await? {
            if matches!(task.state, TaskState::Enabled | TaskState::Started) {
                self.cancel_task(ctx, def, workflow_id, &task.name).await?;
            }
        }
        Ok(())
    }

    /// Propagates a failed task up to its owning workflow (spec §4.7
    /// `fail`: "same shape as cancel but labeled as failure" — no
    /// `cancel_action`, and the parent task's policy is always notified).
    pub(crate) async fn fail_workflow(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
    ) -> Result<(), OrchestratorError> {
        let workflow = self.store.get_workflow(workflow_id).await?;
        if workflow.state.is_terminal() {
            return Ok(());
        }

        self.cancel_active_tasks(ctx, def, workflow_id).await?;
        self.scheduler.cancel_for_workflow(workflow_id).await?;

        self.store
            .patch_workflow(
                workflow_id,
                WorkflowPatch {
                    state: Some(WorkflowState::Failed),
                    payload: None,
                },
            )
            .await?;
        self.run_workflow_activity(ctx, def, workflow_id, "onFailed", Value::Null).await?;
        let trace_id = self.trace_id_for(workflow_id).await?;
        self.audit.flush(&trace_id).await;

        self.propagate_to_parent(ctx, &workflow, SubWorkflowState::Failed, "failed", true)
            .await
    }
}
