//! Work-item lifecycle (spec §4.4): the six typed actions
//! `initialize`/`start`/`complete`/`fail`/`cancel`/`reset`, each validated
//! against its [`ActionDefinition`]'s payload schema and authorization
//! policy, then applied to the [`WorkItemInstance`] row and folded into
//! the owning task's stats shard and policy evaluation.

use serde_json::Value;
use uuid::Uuid;

use crate::context::{CallbackContext, ExecutionContext};
use crate::element::{ActionDefinition, PolicyTransition, WorkflowDefinition};
use crate::error::OrchestratorError;
use crate::instance::{WorkItemInstance, WorkItemParent, WorkItemState};

use super::core::Engine;

impl Engine {
    /// Validates `payload` against `action`'s schema, checks its
    /// authorization policy (skipped for internally-replayed transitions,
    /// spec §4.4/§5: "bypass authorization policies that only the
    /// originating user action cleared"), and runs its callback if any.
    pub(crate) async fn run_action(
        &self,
        ctx: &ExecutionContext,
        action: Option<&ActionDefinition>,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        operation: &str,
        payload: &Value,
    ) -> Result<(), OrchestratorError> {
        let Some(action) = action else { return Ok(()) };
        action.payload_schema.validate(payload)?;

        if !ctx.is_internal_mutation {
            let auth_ctx = crate::element::AuthContext {
                workflow_id,
                task_name: task_name.to_string(),
                work_item_id: None,
                user_id: None,
                payload: payload.clone(),
                is_internal_mutation: false,
            };
            let decision = (action.auth_policy)(&auth_ctx);
            if !decision.allowed {
                return Err(OrchestratorError::ConstraintViolation(
                    decision.reason.unwrap_or_else(|| format!("{operation} denied by policy")),
                ));
            }
        }

        let Some(callback) = action.callback.clone() else { return Ok(()) };
        let callback_ctx = CallbackContext {
            exec: ctx.clone(),
            workflow_id,
            task_name: task_name.to_string(),
            generation,
            payload: payload.clone(),
        };
        let trace_id = self.trace_id_for(workflow_id).await?;
        ctx.with_span(&trace_id, operation, "workItem", task_name, move |child_ctx| {
            let mut callback_ctx = callback_ctx;
            callback_ctx.exec = child_ctx;
            async move { callback(callback_ctx).await }
        })
        .await
    }

    /// Inserts a new [`WorkItemInstance`] under `task_name`'s current
    /// generation, runs the `initialize` action, and records the insert
    /// on the task's stats shard. Called both by the public
    /// `initialize_work_item` entry point and by
    /// [`crate::context::EngineHandle::initialize_work_item`] from within
    /// a task's `onEnabled` callback — the latter runs inline, not queued
    /// (spec §4.4: "`initialize` from within a callback returns the new
    /// work-item id immediately").
    pub(crate) async fn initialize_work_item_logic(
        &self,
        ctx: &ExecutionContext,
        workflow_id: Uuid,
        task_name: &str,
        payload: Value,
    ) -> Result<Uuid, OrchestratorError> {
        let def = self.definition_for_workflow(workflow_id).await?;
        let task_def = def.task(task_name)?;
        let work_item_def = task_def.work_item_definition().ok_or_else(|| {
            OrchestratorError::ConstraintViolation(format!("task '{task_name}' is not atomic"))
        })?;
        let task = self.store.get_task(workflow_id, task_name).await?;

        self.run_action(
            ctx,
            work_item_def.actions.initialize.as_ref(),
            workflow_id,
            task_name,
            task.generation,
            "initialize",
            &payload,
        )
        .await?;

        let workflow = self.store.get_workflow(workflow_id).await?;
        let mut path = workflow.realized_path.clone();
        path.push(workflow_id);
        let parent = WorkItemParent {
            workflow_id,
            task_name: task_name.to_string(),
            task_generation: task.generation,
        };
        let item = WorkItemInstance::new(parent, path, payload, chrono::Utc::now());
        let item_id = item.id;
        self.store.insert_work_item(item).await?;
        super::stats::record_inserted(
            &*self.store,
            workflow_id,
            task_name,
            task.generation,
            task_def.stats_shard_count,
            item_id,
        )
        .await?;

        self.run_task_activity(
            ctx,
            task_def,
            workflow_id,
            task_name,
            task.generation,
            "onWorkItemStateChanged",
            serde_json::json!({ "workItemId": item_id, "from": Value::Null, "to": "initialized" }),
        )
        .await?;

        Ok(item_id)
    }

    pub async fn initialize_work_item(
        self: &std::sync::Arc<Self>,
        workflow_id: Uuid,
        task_name: &str,
        payload: Value,
    ) -> Result<Uuid, OrchestratorError> {
        let ctx = self.new_root_context(crate::context::ExecutionMode::Normal);
        let item_id = self.initialize_work_item_logic(&ctx, workflow_id, task_name, payload).await?;
        self.drain_auto_trigger_queue(&ctx).await?;
        Ok(item_id)
    }

    async fn load_work_item_def<'a>(
        &self,
        def: &'a WorkflowDefinition,
        task_name: &str,
    ) -> Result<&'a crate::element::WorkItemDefinition, OrchestratorError> {
        def.task(task_name)?.work_item_definition().ok_or_else(|| {
            OrchestratorError::ConstraintViolation(format!("task '{task_name}' is not atomic"))
        })
    }

    /// `initialized -> started` (spec §4.4). Ensures the owning task
    /// itself transitions to `started` the first time any of its
    /// children starts.
    pub(crate) async fn start_work_item_logic(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let mut item = self.store.get_work_item(work_item_id).await?;
        if item.state.is_terminal() {
            return Ok(());
        }
        if !matches!(item.state, WorkItemState::Initialized) {
            return Err(OrchestratorError::invalid_transition(
                "workItem",
                work_item_id,
                format!("{:?}", item.state),
                "started",
            ));
        }
        let workflow_id = item.parent.workflow_id;
        let task_name = item.parent.task_name.clone();
        let generation = item.parent.task_generation;
        let def = self.definition_for_workflow(workflow_id).await?;
        let work_item_def = self.load_work_item_def(&def, &task_name).await?;

        self.run_action(
            ctx,
            work_item_def.actions.start.as_ref(),
            workflow_id,
            &task_name,
            generation,
            "start",
            &payload,
        )
        .await?;

        item.state = WorkItemState::Started;
        item.payload = payload;
        item.updated_at = chrono::Utc::now();
        self.store.replace_work_item(item).await?;
        super::stats::record_transition(
            &*self.store,
            workflow_id,
            &task_name,
            generation,
            def.task(&task_name)?.stats_shard_count,
            work_item_id,
            "initialized",
            "started",
        )
        .await?;

        self.start_task(ctx, &def, workflow_id, &task_name).await?;
        self.notify_work_item_state_changed(ctx, &def, workflow_id, &task_name, generation, work_item_id, "initialized", "started")
            .await?;
        Ok(())
    }

    pub async fn start_work_item(
        self: &std::sync::Arc<Self>,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let ctx = self.new_root_context(crate::context::ExecutionMode::Normal);
        self.start_work_item_logic(&ctx, work_item_id, payload).await?;
        self.drain_auto_trigger_queue(&ctx).await
    }

    /// `started -> completed` (spec §4.4): runs the `complete` action,
    /// records the transition, and invokes the owning task's policy.
    pub(crate) async fn complete_work_item_logic(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let mut item = self.store.get_work_item(work_item_id).await?;
        if item.state.is_terminal() {
            return Ok(());
        }
        if !matches!(item.state, WorkItemState::Started) {
            return Err(OrchestratorError::invalid_transition(
                "workItem",
                work_item_id,
                format!("{:?}", item.state),
                "completed",
            ));
        }
        let workflow_id = item.parent.workflow_id;
        let task_name = item.parent.task_name.clone();
        let generation = item.parent.task_generation;
        let def = self.definition_for_workflow(workflow_id).await?;
        let work_item_def = self.load_work_item_def(&def, &task_name).await?;

        self.run_action(
            ctx,
            work_item_def.actions.complete.as_ref(),
            workflow_id,
            &task_name,
            generation,
            "complete",
            &payload,
        )
        .await?;

        item.state = WorkItemState::Completed;
        item.payload = payload;
        item.updated_at = chrono::Utc::now();
        self.store.replace_work_item(item).await?;
        super::stats::record_transition(
            &*self.store,
            workflow_id,
            &task_name,
            generation,
            def.task(&task_name)?.stats_shard_count,
            work_item_id,
            "started",
            "completed",
        )
        .await?;

        self.notify_work_item_state_changed(ctx, &def, workflow_id, &task_name, generation, work_item_id, "started", "completed")
            .await?;
        self.apply_task_policy(
            ctx,
            &def,
            workflow_id,
            &task_name,
            generation,
            PolicyTransition {
                prev_state: "started".to_string(),
                next_state: "completed".to_string(),
            },
        )
        .await
    }

    pub async fn complete_work_item(
        self: &std::sync::Arc<Self>,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let ctx = self.new_root_context(crate::context::ExecutionMode::Normal);
        self.complete_work_item_logic(&ctx, work_item_id, payload).await?;
        self.drain_auto_trigger_queue(&ctx).await
    }

    /// `started -> failed` (spec §4.4): mirrors `complete_work_item_logic`
    /// but labels the transition as failure.
    pub(crate) async fn fail_work_item_logic(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let mut item = self.store.get_work_item(work_item_id).await?;
        if item.state.is_terminal() {
            return Ok(());
        }
        if !matches!(item.state, WorkItemState::Started) {
            return Err(OrchestratorError::invalid_transition(
                "workItem",
                work_item_id,
                format!("{:?}", item.state),
                "failed",
            ));
        }
        let workflow_id = item.parent.workflow_id;
        let task_name = item.parent.task_name.clone();
        let generation = item.parent.task_generation;
        let def = self.definition_for_workflow(workflow_id).await?;
        let work_item_def = self.load_work_item_def(&def, &task_name).await?;

        self.run_action(
            ctx,
            work_item_def.actions.fail.as_ref(),
            workflow_id,
            &task_name,
            generation,
            "fail",
            &payload,
        )
        .await?;

        item.state = WorkItemState::Failed;
        item.payload = payload;
        item.updated_at = chrono::Utc::now();
        self.store.replace_work_item(item).await?;
        super::stats::record_transition(
            &*self.store,
            workflow_id,
            &task_name,
            generation,
            def.task(&task_name)?.stats_shard_count,
            work_item_id,
            "started",
            "failed",
        )
        .await?;

        if let Some(on_failed) = work_item_def.on_failed.clone() {
            let trace_id = self.trace_id_for(workflow_id).await?;
            let callback_ctx = CallbackContext {
                exec: ctx.clone(),
                workflow_id,
                task_name: task_name.clone(),
                generation,
                payload: Value::Null,
            };
            ctx.with_span(&trace_id, "onFailed", "workItem", &task_name, move |child_ctx| {
                let mut callback_ctx = callback_ctx;
                callback_ctx.exec = child_ctx;
                async move { on_failed(callback_ctx).await }
            })
            .await?;
        }

        self.notify_work_item_state_changed(ctx, &def, workflow_id, &task_name, generation, work_item_id, "started", "failed")
            .await?;
        self.apply_task_policy(
            ctx,
            &def,
            workflow_id,
            &task_name,
            generation,
            PolicyTransition {
                prev_state: "started".to_string(),
                next_state: "failed".to_string(),
            },
        )
        .await
    }

    pub async fn fail_work_item(
        self: &std::sync::Arc<Self>,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let ctx = self.new_root_context(crate::context::ExecutionMode::Normal);
        self.fail_work_item_logic(&ctx, work_item_id, payload).await?;
        self.drain_auto_trigger_queue(&ctx).await
    }

    /// `initialized | started -> canceled` (spec §4.4, idempotent on an
    /// already-terminal item per law L1). Public entry point and internal
    /// cascades (cancellation regions, parent teardown) both funnel
    /// through [`Engine::cancel_work_item_internal`], which additionally
    /// lets the caller suppress the owning task's policy evaluation when
    /// the cancellation is external to that task (spec §4.6:
    /// `callPolicy = false`).
    pub(crate) async fn cancel_work_item_logic(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        self.cancel_work_item_internal(ctx, work_item_id, payload, true).await
    }

    pub(crate) async fn cancel_work_item_internal(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
        notify_policy: bool,
    ) -> Result<(), OrchestratorError> {
        let mut item = self.store.get_work_item(work_item_id).await?;
        if item.state.is_terminal() {
            return Ok(());
        }
        let prev_state = format!("{:?}", item.state).to_lowercase();
        let workflow_id = item.parent.workflow_id;
        let task_name = item.parent.task_name.clone();
        let generation = item.parent.task_generation;
        let def = self.definition_for_workflow(workflow_id).await?;
        let work_item_def = self.load_work_item_def(&def, &task_name).await?;

        self.run_action(
            ctx,
            work_item_def.actions.cancel.as_ref(),
            workflow_id,
            &task_name,
            generation,
            "cancel",
            &payload,
        )
        .await?;

        item.state = WorkItemState::Canceled;
        item.updated_at = chrono::Utc::now();
        self.store.replace_work_item(item).await?;
        super::stats::record_transition(
            &*self.store,
            workflow_id,
            &task_name,
            generation,
            def.task(&task_name)?.stats_shard_count,
            work_item_id,
            &prev_state,
            "canceled",
        )
        .await?;
        self.scheduler.cancel_for_task(workflow_id, &task_name).await?;

        if let Some(on_canceled) = work_item_def.on_canceled.clone() {
            let trace_id = self.trace_id_for(workflow_id).await?;
            let callback_ctx = CallbackContext {
                exec: ctx.clone(),
                workflow_id,
                task_name: task_name.clone(),
                generation,
                payload: Value::Null,
            };
            ctx.with_span(&trace_id, "onCanceled", "workItem", &task_name, move |child_ctx| {
                let mut callback_ctx = callback_ctx;
                callback_ctx.exec = child_ctx;
                async move { on_canceled(callback_ctx).await }
            })
            .await?;
        }

        self.notify_work_item_state_changed(ctx, &def, workflow_id, &task_name, generation, work_item_id, &prev_state, "canceled")
            .await?;

        if notify_policy {
            self.apply_task_policy(
                ctx,
                &def,
                workflow_id,
                &task_name,
                generation,
                PolicyTransition {
                    prev_state,
                    next_state: "canceled".to_string(),
                },
            )
            .await?;
        }
        Ok(())
    }

    pub async fn cancel_work_item(
        self: &std::sync::Arc<Self>,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let ctx = self.new_root_context(crate::context::ExecutionMode::Normal);
        self.cancel_work_item_logic(&ctx, work_item_id, payload).await?;
        self.drain_auto_trigger_queue(&ctx).await
    }

    /// `started -> initialized` (spec §4.4), only permitted when the work
    /// item's definition declares a `reset` action at all.
    pub(crate) async fn reset_work_item_logic(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let mut item = self.store.get_work_item(work_item_id).await?;
        if !matches!(item.state, WorkItemState::Started) {
            return Err(OrchestratorError::invalid_transition(
                "workItem",
                work_item_id,
                format!("{:?}", item.state),
                "initialized",
            ));
        }
        let workflow_id = item.parent.workflow_id;
        let task_name = item.parent.task_name.clone();
        let generation = item.parent.task_generation;
        let def = self.definition_for_workflow(workflow_id).await?;
        let work_item_def = self.load_work_item_def(&def, &task_name).await?;
        if !work_item_def.allows_reset() {
            return Err(OrchestratorError::ConstraintViolation(format!(
                "work item '{work_item_id}' does not allow reset"
            )));
        }

        self.run_action(
            ctx,
            work_item_def.actions.reset.as_ref(),
            workflow_id,
            &task_name,
            generation,
            "reset",
            &payload,
        )
        .await?;

        item.state = WorkItemState::Initialized;
        item.claim = None;
        item.payload = payload;
        item.updated_at = chrono::Utc::now();
        self.store.replace_work_item(item).await?;
        super::stats::record_transition(
            &*self.store,
            workflow_id,
            &task_name,
            generation,
            def.task(&task_name)?.stats_shard_count,
            work_item_id,
            "started",
            "initialized",
        )
        .await?;

        self.notify_work_item_state_changed(ctx, &def, workflow_id, &task_name, generation, work_item_id, "started", "initialized")
            .await
    }

    pub async fn reset_work_item(
        self: &std::sync::Arc<Self>,
        work_item_id: Uuid,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let ctx = self.new_root_context(crate::context::ExecutionMode::Normal);
        self.reset_work_item_logic(&ctx, work_item_id, payload).await?;
        self.drain_auto_trigger_queue(&ctx).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn notify_work_item_state_changed(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        work_item_id: Uuid,
        from: &str,
        to: &str,
    ) -> Result<(), OrchestratorError> {
        let task_def = def.task(task_name)?;
        self.run_task_activity(
            ctx,
            task_def,
            workflow_id,
            task_name,
            generation,
            "onWorkItemStateChanged",
            serde_json::json!({ "workItemId": work_item_id, "from": from, "to": to }),
        )
        .await
    }
}
