//! Per-mutation execution context and the work-item auto-trigger queue.
//!
//! Every engine entry point is invoked with an [`ExecutionContext`]: a
//! small, cheaply-cloneable bundle that carries the transactional store
//! handle, the audit trace position, the scheduler bridge, and the flags
//! that distinguish a user-originated call from one replayed internally
//! (auto-triggered, or fast-forwarded by a migration). This mirrors the
//! durable-execution engine's `isInternalMutation`-flavored internal
//! contexts, generalized to the orchestrator's re-entrancy problem.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::AuditBridge;
use crate::error::OrchestratorError;
use crate::scheduler::SchedulerBridge;

/// Whether a workflow instance is being driven through ordinary lifecycle
/// callbacks or reconstructed by a migration without firing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionMode {
    Normal,
    FastForward,
}

use serde::{Deserialize, Serialize};

/// A nested lifecycle transition requested from inside a running
/// callback. Recorded rather than executed immediately; see
/// [`WorkItemAutoTriggerQueue`].
#[derive(Debug, Clone)]
pub enum QueuedTrigger {
    StartWorkItem { work_item_id: Uuid, payload: Value },
    CompleteWorkItem { work_item_id: Uuid, payload: Value },
    FailWorkItem { work_item_id: Uuid, payload: Value },
    CancelWorkItem { work_item_id: Uuid, payload: Value },
    ResetWorkItem { work_item_id: Uuid, payload: Value },
}

/// FIFO queue of nested transition requests raised by lifecycle callbacks
/// while an outer transition is still being persisted.
///
/// Contract (spec §4.4): during a lifecycle callback, nested requests are
/// appended here rather than invoked synchronously. Once the outer
/// transition finishes persisting its own state, the queue is drained
/// sequentially — never concurrently — and a drained entry may itself
/// append further entries. Draining stops when the queue is empty.
#[derive(Debug, Default)]
pub struct WorkItemAutoTriggerQueue {
    entries: VecDeque<QueuedTrigger>,
}

impl WorkItemAutoTriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trigger: QueuedTrigger) {
        self.entries.push_back(trigger);
    }

    pub fn pop_front(&mut self) -> Option<QueuedTrigger> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Facade the `element`/`policy` layers use to request nested engine
/// operations (starting a work item from within `onInitialized`,
/// initializing a sub-workflow from within a composite task's
/// `onEnabled`, registering a scheduled function) without depending on
/// the concrete engine type. The engine implements this trait; callbacks
/// only ever see `Arc<dyn EngineHandle>`.
///
/// This is the seam that keeps `element` and `context` free of a
/// dependency on `engine`, avoiding a module cycle: `engine` depends on
/// `element`/`context`, and implements `EngineHandle` itself.
pub trait EngineHandle: Send + Sync + fmt::Debug {
    fn initialize_work_item<'a>(
        &'a self,
        ctx: ExecutionContext,
        workflow_id: Uuid,
        task_name: &'a str,
        payload: Value,
    ) -> BoxFuture<'a, Result<Uuid, OrchestratorError>>;

    fn request_start_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value);

    fn request_complete_work_item(
        &self,
        ctx: &ExecutionContext,
        work_item_id: Uuid,
        payload: Value,
    );

    fn request_fail_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value);

    fn request_cancel_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value);

    fn initialize_sub_workflow<'a>(
        &'a self,
        ctx: ExecutionContext,
        parent_workflow_id: Uuid,
        parent_task_name: &'a str,
        child_name: &'a str,
        payload: Value,
    ) -> BoxFuture<'a, Result<Uuid, OrchestratorError>>;

    fn register_scheduled<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        key: crate::instance::scheduled::ScheduledKey,
        delay_ms: i64,
        function: crate::scheduler::ScheduledFunction,
    ) -> BoxFuture<'a, Result<String, OrchestratorError>>;
}

/// The per-mutation bundle carried through every engine call.
///
/// Cloning an `ExecutionContext` is cheap: the store, scheduler, and audit
/// bridge are held behind `Arc`s, and the auto-trigger queue is shared
/// behind a lock so nested internal contexts created by `extend` observe
/// the same drain queue as their parent.
#[derive(Clone)]
pub struct ExecutionContext {
    pub store: Arc<dyn crate::persistence::TransactionalStore>,
    pub scheduler: Arc<dyn SchedulerBridge>,
    pub audit: Arc<dyn AuditBridge>,
    pub engine: Arc<dyn EngineHandle>,
    pub queue: Arc<parking_lot::Mutex<WorkItemAutoTriggerQueue>>,
    /// True for transitions replayed from the auto-trigger queue, which
    /// bypass authorization policies that only the originating user
    /// action cleared.
    pub is_internal_mutation: bool,
    pub execution_mode: ExecutionMode,
    /// Current audit span id, if a span is open for this context.
    pub current_span_id: Option<String>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("is_internal_mutation", &self.is_internal_mutation)
            .field("execution_mode", &self.execution_mode)
            .field("current_span_id", &self.current_span_id)
            .finish()
    }
}

impl ExecutionContext {
    /// Shallow-copy this context with overridden internal-mutation and/or
    /// execution-mode flags, as the spec's `extend({ isInternalMutation?,
    /// executionMode? })` does.
    pub fn extend(
        &self,
        is_internal_mutation: Option<bool>,
        execution_mode: Option<ExecutionMode>,
    ) -> Self {
        Self {
            store: self.store.clone(),
            scheduler: self.scheduler.clone(),
            audit: self.audit.clone(),
            engine: self.engine.clone(),
            queue: self.queue.clone(),
            is_internal_mutation: is_internal_mutation.unwrap_or(self.is_internal_mutation),
            execution_mode: execution_mode.unwrap_or(self.execution_mode),
            current_span_id: self.current_span_id.clone(),
        }
    }

    /// Open an audit span, run `fn`, and complete or fail the span
    /// depending on the outcome, propagating the new child span id into
    /// the context passed to `f`.
    pub async fn with_span<F, Fut, T>(
        &self,
        trace_id: &str,
        operation: &str,
        resource_type: &str,
        resource_name: &str,
        f: F,
    ) -> Result<T, OrchestratorError>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: std::future::Future<Output = Result<T, OrchestratorError>>,
    {
        let span_id = self
            .audit
            .start_span(
                trace_id,
                self.current_span_id.as_deref(),
                operation,
                resource_type,
                resource_name,
            )
            .await?;
        let mut child = self.clone();
        child.current_span_id = Some(span_id.clone());

        match f(child).await {
            Ok(value) => {
                self.audit.complete_span(trace_id, &span_id, None).await?;
                Ok(value)
            }
            Err(err) => {
                self.audit
                    .fail_span(trace_id, &span_id, &err.to_string())
                    .await?;
                Err(err)
            }
        }
    }

    pub fn push_trigger(&self, trigger: QueuedTrigger) {
        self.queue.lock().push(trigger);
    }
}

/// Context handed to a user lifecycle/action callback.
#[derive(Clone)]
pub struct CallbackContext {
    pub exec: ExecutionContext,
    pub workflow_id: Uuid,
    pub task_name: String,
    pub generation: u64,
    pub payload: Value,
}

/// Context handed to a workflow-level lifecycle callback (root or
/// sub-workflow `onInitialized`/`onStarted`/`onCompleted`/`onCanceled`/
/// `onFailed`, and the workflow-level `cancel` action from spec §4.7).
/// Kept distinct from [`CallbackContext`] because a workflow has no owning
/// task name or generation of its own.
#[derive(Clone)]
pub struct WorkflowCallbackContext {
    pub exec: ExecutionContext,
    pub workflow_id: Uuid,
    pub payload: Value,
}
