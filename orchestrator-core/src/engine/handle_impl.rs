//! `impl EngineHandle for Engine`: the seam [`crate::element`]/[`crate::context`]
//! callbacks use to request nested engine operations without depending on
//! the concrete engine type (spec §4.4/§4.7/§4.10).

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::context::{EngineHandle, ExecutionContext, QueuedTrigger};
use crate::error::OrchestratorError;
use crate::instance::ScheduledKey;
use crate::scheduler::ScheduledFunction;

use super::core::Engine;

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish()
    }
}

impl EngineHandle for Engine {
    /// Runs inline rather than queuing: spec §4.4 guarantees the new work
    /// item's id back to the callback that asked for it immediately.
    fn initialize_work_item<'a>(
        &'a self,
        ctx: ExecutionContext,
        workflow_id: Uuid,
        task_name: &'a str,
        payload: Value,
    ) -> BoxFuture<'a, Result<Uuid, OrchestratorError>> {
        Box::pin(async move { self.initialize_work_item_logic(&ctx, workflow_id, task_name, payload).await })
    }

    fn request_start_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value) {
        ctx.push_trigger(QueuedTrigger::StartWorkItem { work_item_id, payload });
    }

    fn request_complete_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value) {
        ctx.push_trigger(QueuedTrigger::CompleteWorkItem { work_item_id, payload });
    }

    fn request_fail_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value) {
        ctx.push_trigger(QueuedTrigger::FailWorkItem { work_item_id, payload });
    }

    fn request_cancel_work_item(&self, ctx: &ExecutionContext, work_item_id: Uuid, payload: Value) {
        ctx.push_trigger(QueuedTrigger::CancelWorkItem { work_item_id, payload });
    }

    /// Also runs inline: a composite task's `onEnabled` needs the child's
    /// id to track it (spec §4.7).
    fn initialize_sub_workflow<'a>(
        &'a self,
        ctx: ExecutionContext,
        parent_workflow_id: Uuid,
        parent_task_name: &'a str,
        child_name: &'a str,
        payload: Value,
    ) -> BoxFuture<'a, Result<Uuid, OrchestratorError>> {
        Box::pin(async move {
            self.initialize_sub_workflow_logic(&ctx, parent_workflow_id, parent_task_name, child_name, payload)
                .await
        })
    }

    fn register_scheduled<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        key: ScheduledKey,
        delay_ms: i64,
        function: ScheduledFunction,
    ) -> BoxFuture<'a, Result<String, OrchestratorError>> {
        Box::pin(async move {
            let delay = Duration::from_millis(delay_ms.max(0) as u64);
            let id = ctx.scheduler.schedule_after(delay, key, function).await?;
            Ok(id)
        })
    }
}
