//! [`Engine`]: the stateful facade every public entry point (spec §6) and
//! every [`crate::context::EngineHandle`] callback is a method on.
//!
//! Mirrors `everruns-durable`'s `WorkflowExecutor<S>`: one long-lived
//! value holding the store, a pluggable bridge per side-concern, and
//! configuration, constructed once and shared behind an `Arc` so every
//! [`ExecutionContext`] can carry a cheap handle back to it.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::audit::AuditBridge;
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, ExecutionMode, WorkItemAutoTriggerQueue};
use crate::element::{TaskCallback, TaskDefinition, WorkflowDefinition};
use crate::error::OrchestratorError;
use crate::instance::TaskState;
use crate::persistence::TransactionalStore;
use crate::scheduler::SchedulerBridge;

use super::registry::WorkflowRegistry;

pub struct Engine {
    pub(crate) store: Arc<dyn TransactionalStore>,
    pub(crate) scheduler: Arc<dyn SchedulerBridge>,
    pub(crate) audit: Arc<dyn AuditBridge>,
    pub registry: WorkflowRegistry,
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn TransactionalStore>,
        scheduler: Arc<dyn SchedulerBridge>,
        audit: Arc<dyn AuditBridge>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            scheduler,
            audit,
            registry: WorkflowRegistry::new(),
            config,
        })
    }

    /// A fresh root [`ExecutionContext`] for a new, user-originated
    /// mutation: a new auto-trigger queue, `is_internal_mutation = false`,
    /// and `execution_mode` as given (normal for every public entry point
    /// except the migration manager's fast-forward initializer).
    pub(crate) fn new_root_context(self: &Arc<Self>, execution_mode: ExecutionMode) -> ExecutionContext {
        ExecutionContext {
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
            audit: self.audit.clone(),
            engine: self.clone() as Arc<dyn crate::context::EngineHandle>,
            queue: Arc::new(Mutex::new(WorkItemAutoTriggerQueue::new())),
            is_internal_mutation: false,
            execution_mode,
            current_span_id: None,
        }
    }

    /// Drains `ctx`'s auto-trigger queue to completion (spec §4.4): pops
    /// FIFO, dispatches each queued transition with a fresh
    /// `isInternalMutation=true` context that shares the very same queue
    /// (so a drained entry's own callbacks can append further entries),
    /// and stops once the queue is empty. Guards against runaway
    /// re-entrant chains with [`crate::config::EngineConfig::max_auto_trigger_queue_depth`].
    pub(crate) async fn drain_auto_trigger_queue(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<(), OrchestratorError> {
        let mut processed = 0usize;
        loop {
            let next = ctx.queue.lock().pop_front();
            let Some(trigger) = next else { break };
            processed += 1;
            if processed > self.config.max_auto_trigger_queue_depth {
                return Err(OrchestratorError::ConstraintViolation(format!(
                    "auto-trigger queue exceeded max depth {}",
                    self.config.max_auto_trigger_queue_depth
                )));
            }
            let inner = ctx.extend(Some(true), None);
            self.dispatch_trigger(&inner, trigger).await?;
        }
        Ok(())
    }

    async fn dispatch_trigger(
        &self,
        ctx: &ExecutionContext,
        trigger: crate::context::QueuedTrigger,
    ) -> Result<(), OrchestratorError> {
        use crate::context::QueuedTrigger;
        match trigger {
            QueuedTrigger::StartWorkItem { work_item_id, payload } => {
                self.start_work_item_logic(ctx, work_item_id, payload).await
            }
            QueuedTrigger::CompleteWorkItem { work_item_id, payload } => {
                self.complete_work_item_logic(ctx, work_item_id, payload).await
            }
            QueuedTrigger::FailWorkItem { work_item_id, payload } => {
                self.fail_work_item_logic(ctx, work_item_id, payload).await
            }
            QueuedTrigger::CancelWorkItem { work_item_id, payload } => {
                self.cancel_work_item_logic(ctx, work_item_id, payload).await
            }
            QueuedTrigger::ResetWorkItem { work_item_id, payload } => {
                self.reset_work_item_logic(ctx, work_item_id, payload).await
            }
        }
    }

    /// Looks up the definition owning `task_name` by walking the registry
    /// entry for `(workflow_name, version_name)` recorded on the
    /// workflow instance itself, so nested calls never need the caller to
    /// keep re-threading a `&WorkflowDefinition` reference across an
    /// `await`.
    pub(crate) async fn definition_for_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<Arc<WorkflowDefinition>, OrchestratorError> {
        let workflow = self.store.get_workflow(workflow_id).await?;
        self.registry
            .get_by_name(&workflow.workflow_name, &workflow.version_name)
    }

    /// Runs one of a task's [`crate::element::Activities`] callbacks by
    /// lifecycle point name, defaulting to no-op when the task author
    /// left it unset (spec §4.1).
    pub(crate) async fn run_task_activity(
        &self,
        ctx: &ExecutionContext,
        task_def: &TaskDefinition,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        point: &str,
        payload: serde_json::Value,
    ) -> Result<(), OrchestratorError> {
        let callback: Option<&TaskCallback> = match point {
            "onEnabled" => task_def.activities.on_enabled.as_ref(),
            "onStarted" => task_def.activities.on_started.as_ref(),
            "onCompleted" => task_def.activities.on_completed.as_ref(),
            "onFailed" => task_def.activities.on_failed.as_ref(),
            "onCanceled" => task_def.activities.on_canceled.as_ref(),
            "onDisabled" => task_def.activities.on_disabled.as_ref(),
            "onWorkItemStateChanged" => task_def.activities.on_work_item_state_changed.as_ref(),
            "onWorkflowStateChanged" => task_def.activities.on_workflow_state_changed.as_ref(),
            _ => None,
        };
        let Some(callback) = callback else { return Ok(()) };
        let callback_ctx = crate::context::CallbackContext {
            exec: ctx.clone(),
            workflow_id,
            task_name: task_name.to_string(),
            generation,
            payload,
        };
        let callback = callback.clone();
        ctx.with_span(
            &self.trace_id_for(workflow_id).await?,
            point,
            "task",
            task_name,
            move |child_ctx| {
                let mut callback_ctx = callback_ctx;
                callback_ctx.exec = child_ctx;
                async move { callback(callback_ctx).await }
            },
        )
        .await
    }

    pub(crate) async fn trace_id_for(&self, workflow_id: Uuid) -> Result<String, OrchestratorError> {
        match self.audit.load_context(workflow_id).await? {
            Some(audit_ctx) => Ok(audit_ctx.trace_id),
            None => Ok(workflow_id.to_string()),
        }
    }

    pub(crate) fn is_terminal(state: TaskState) -> bool {
        state.is_terminal()
    }
}
