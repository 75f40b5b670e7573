//! Shared fixtures for the end-to-end lifecycle tests (spec §8): a fresh
//! `InMemoryStore`-backed engine, and an `onEnabled` callback that mimics
//! a host immediately handing an atomic task's work out, since this
//! engine itself never auto-creates a work item on enablement.

use std::sync::Arc;

use orchestrator_core::prelude::*;
use serde_json::Value;
use uuid::Uuid;

pub fn new_engine() -> Arc<Engine> {
    new_engine_with_store().0
}

/// Same as [`new_engine`] but also hands back the concrete
/// `InMemoryStore`, for tests that need to look up a sub-workflow's id
/// directly rather than through the query surface aimed at real hosts.
pub fn new_engine_with_store() -> (Arc<Engine>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let scheduler = Arc::new(DefaultSchedulerBridge::new(
        Arc::new(InMemorySchedulerHandle::new()),
        store.clone(),
    ));
    let audit = Arc::new(InMemoryAuditBridge::new(store.clone()));
    let engine = Engine::new(store.clone(), scheduler, audit, EngineConfig::default());
    (engine, store)
}

/// Looks up the workflow id of the single sub-workflow a composite task
/// spawned under `task_name`'s given generation, via the sub-workflow
/// join row the engine maintains — the public query surface addresses
/// workflows by id, not by "the child of task X", so tests that need
/// that id reach past it into the store directly.
pub async fn child_workflow_id_for(
    store: &Arc<InMemoryStore>,
    parent_workflow_id: Uuid,
    task_name: &str,
    generation: u64,
) -> Uuid {
    let subs = store
        .list_sub_workflows_by_parent(parent_workflow_id, task_name, generation)
        .await
        .expect("sub-workflows");
    assert_eq!(subs.len(), 1, "expected exactly one sub-workflow for '{task_name}'");
    subs[0].workflow_id
}

/// An `onEnabled` activity that immediately initializes a work item for
/// its own task, the way a host wiring a real automation would.
pub fn auto_initialize_work_item() -> orchestrator_core::element::TaskCallback {
    Arc::new(move |ctx: orchestrator_core::context::CallbackContext| {
        Box::pin(async move {
            let engine = ctx.exec.engine.clone();
            let exec = ctx.exec.clone();
            let workflow_id = ctx.workflow_id;
            let task_name = ctx.task_name.clone();
            engine
                .initialize_work_item(exec, workflow_id, &task_name, Value::Null)
                .await?;
            Ok(())
        })
    })
}
