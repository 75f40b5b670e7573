//! A composite task spins up a sub-workflow instance and the parent net
//! only completes once that child does (spec §8, scenario 5).

mod support;

use std::sync::Arc;

use orchestrator_core::context::CallbackContext;
use orchestrator_core::element::{Activities, TaskCallback, WorkItemDefinition};
use orchestrator_core::engine::WorkflowTaskStates;
use orchestrator_core::prelude::*;
use serde_json::{json, Value};

fn child_definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("child_approval", "v1")
        .start_condition("start")
        .end_condition("end")
        .connect_condition("start", ConnectTo::task("child_task"))
        .task("child_task", WorkItemDefinition::new(), TaskOptions::default())
        .connect_task("child_task", ConnectTo::condition("end"))
        .build()
        .expect("well-formed child definition")
}

fn on_enabled_spawn_child() -> TaskCallback {
    Arc::new(move |ctx: CallbackContext| {
        Box::pin(async move {
            let engine = ctx.exec.engine.clone();
            let exec = ctx.exec.clone();
            let workflow_id = ctx.workflow_id;
            let task_name = ctx.task_name.clone();
            engine
                .initialize_sub_workflow(exec, workflow_id, &task_name, "", Value::Null)
                .await?;
            Ok(())
        })
    })
}

fn parent_definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("parent_process", "v1")
        .start_condition("start")
        .end_condition("end")
        .connect_condition("start", ConnectTo::task("review"))
        .composite_task(
            "review",
            child_definition(),
            TaskOptions {
                activities: Activities {
                    on_enabled: Some(on_enabled_spawn_child()),
                    ..Activities::default()
                },
                ..TaskOptions::default()
            },
        )
        .connect_task("review", ConnectTo::condition("end"))
        .build()
        .expect("well-formed parent definition")
}

#[tokio::test]
async fn composite_task_completes_once_its_child_workflow_completes() {
    let (engine, store) = support::new_engine_with_store();
    engine.registry.register(child_definition());
    engine.registry.register(parent_definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("parent_process", "v1"), json!({}))
        .await
        .expect("initialize");

    // Spinning up the child cascades `ensureStarted` all the way back up
    // to the root, and the composite task itself, before this call returns.
    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Started);
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("review"), Some(&TaskState::Started));

    // Drive the child's own atomic task to completion directly; the
    // engine exposes work items by id regardless of which workflow
    // instance owns them, so the test only needs the root's id to look
    // the review task's child up through the registry-backed structure.
    let child_task_states = find_child_task_states(&engine, &store, workflow_id).await;
    assert_eq!(child_task_states.get("child_task"), Some(&TaskState::Enabled));

    let child_workflow_id = find_child_workflow_id(&engine, &store, workflow_id).await;
    let item_id = engine
        .initialize_work_item(child_workflow_id, "child_task", json!({}))
        .await
        .unwrap();
    engine.start_work_item(item_id, serde_json::Value::Null).await.unwrap();
    engine.complete_work_item(item_id, json!({})).await.unwrap();

    assert_eq!(engine.get_workflow_state(child_workflow_id).await.unwrap(), WorkflowState::Completed);
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("review"), Some(&TaskState::Completed));
    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Completed);
}

/// Test-only helper: the public query surface addresses work items and
/// workflows by id, not by "the child of task X"; this single test needs
/// that id, so it confirms exactly one sub-workflow was spawned via the
/// aggregated task stats, then recovers the child's own workflow id
/// through the sub-workflow join row via `support::child_workflow_id_for`.
async fn find_child_workflow_id(
    engine: &std::sync::Arc<Engine>,
    store: &std::sync::Arc<InMemoryStore>,
    parent_workflow_id: uuid::Uuid,
) -> uuid::Uuid {
    let stats = engine
        .get_aggregated_task_stats(parent_workflow_id, "review", 1)
        .await
        .expect("stats");
    assert_eq!(stats.total, 1, "exactly one sub-workflow should have been spawned");
    support::child_workflow_id_for(store, parent_workflow_id, "review", 1).await
}

async fn find_child_task_states(
    engine: &std::sync::Arc<Engine>,
    store: &std::sync::Arc<InMemoryStore>,
    parent_workflow_id: uuid::Uuid,
) -> WorkflowTaskStates {
    let child_id = find_child_workflow_id(engine, store, parent_workflow_id).await;
    engine.get_workflow_task_states(child_id).await.unwrap()
}
