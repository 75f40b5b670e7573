//! End-to-end happy path for the simplest possible net: one atomic task
//! between the start and end conditions (spec §8, scenario 1).

mod support;

use orchestrator_core::element::WorkItemDefinition;
use orchestrator_core::prelude::*;
use serde_json::json;

fn definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("approval", "v1")
        .start_condition("start")
        .end_condition("end")
        .connect_condition("start", ConnectTo::task("review"))
        .task("review", WorkItemDefinition::new(), TaskOptions::default())
        .connect_task("review", ConnectTo::condition("end"))
        .build()
        .expect("well-formed definition")
}

#[tokio::test]
async fn atomic_task_runs_start_to_completion() {
    let engine = support::new_engine();
    engine.registry.register(definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("approval", "v1"), json!({ "applicant": "jane" }))
        .await
        .expect("initialize");

    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Started);
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("review"), Some(&TaskState::Enabled));

    let item_id = engine
        .initialize_work_item(workflow_id, "review", json!({ "note": "looks good" }))
        .await
        .expect("initialize work item");
    assert_eq!(engine.get_work_item_state(item_id).await.unwrap(), WorkItemState::Initialized);

    engine.start_work_item(item_id, serde_json::Value::Null).await.expect("start");
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("review"), Some(&TaskState::Started));

    engine
        .complete_work_item(item_id, json!({ "decision": "approved" }))
        .await
        .expect("complete");

    assert_eq!(engine.get_work_item_state(item_id).await.unwrap(), WorkItemState::Completed);
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("review"), Some(&TaskState::Completed));
    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Completed);
}

#[tokio::test]
async fn completing_an_already_terminal_work_item_is_idempotent() {
    let engine = support::new_engine();
    engine.registry.register(definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("approval", "v1"), json!({}))
        .await
        .unwrap();
    let item_id = engine.initialize_work_item(workflow_id, "review", json!({})).await.unwrap();
    engine.start_work_item(item_id, serde_json::Value::Null).await.unwrap();
    engine.complete_work_item(item_id, json!({})).await.unwrap();

    // L1 (spec §8): re-completing a terminal work item is a no-op, not an error.
    engine.complete_work_item(item_id, json!({})).await.expect("idempotent complete");
    assert_eq!(engine.get_work_item_state(item_id).await.unwrap(), WorkItemState::Completed);
}
