//! An `xor`-split gate routes to exactly one of two branches depending on
//! payload, and only that branch's task ever enables (spec §8, scenario 2).

mod support;

use std::sync::Arc;

use orchestrator_core::element::{RouteInput, SplitType, WorkItemDefinition};
use orchestrator_core::prelude::*;
use serde_json::json;

fn definition() -> WorkflowDefinition {
    let route = Arc::new(|input: RouteInput<'_>| {
        let approved = input.payload.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
        let chosen = if approved { "cond_approved" } else { "cond_rejected" };
        vec![chosen.to_string()]
    });

    WorkflowDefinitionBuilder::new("gate", "v1")
        .start_condition("start")
        .end_condition("end")
        .condition("cond_approved")
        .condition("cond_rejected")
        .connect_condition("start", ConnectTo::task("gate"))
        .dummy_task(
            "gate",
            TaskOptions {
                split_type: SplitType::Xor,
                ..TaskOptions::default()
            },
        )
        .connect_task(
            "gate",
            ConnectTo::conditions(["cond_approved", "cond_rejected"]).with_route(route),
        )
        .task("approve", WorkItemDefinition::new(), TaskOptions::default())
        .task("reject", WorkItemDefinition::new(), TaskOptions::default())
        .connect_condition("cond_approved", ConnectTo::task("approve"))
        .connect_condition("cond_rejected", ConnectTo::task("reject"))
        .connect_task("approve", ConnectTo::condition("end"))
        .connect_task("reject", ConnectTo::condition("end"))
        .build()
        .expect("well-formed definition")
}

#[tokio::test]
async fn xor_split_enables_only_the_chosen_branch() {
    let engine = support::new_engine();
    engine.registry.register(definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("gate", "v1"), json!({ "approved": true }))
        .await
        .unwrap();

    // The dummy gate auto-fires straight through to completed; only the
    // "approved" branch should have enabled.
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("gate"), Some(&TaskState::Completed));
    assert_eq!(states.get("approve"), Some(&TaskState::Enabled));
    assert_eq!(states.get("reject"), Some(&TaskState::Disabled));

    let item_id = engine.initialize_work_item(workflow_id, "approve", json!({})).await.unwrap();
    engine.start_work_item(item_id, serde_json::Value::Null).await.unwrap();
    engine.complete_work_item(item_id, json!({})).await.unwrap();

    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Completed);
}

#[tokio::test]
async fn xor_split_takes_the_other_branch_for_the_other_payload() {
    let engine = support::new_engine();
    engine.registry.register(definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("gate", "v1"), json!({ "approved": false }))
        .await
        .unwrap();

    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("reject"), Some(&TaskState::Enabled));
    assert_eq!(states.get("approve"), Some(&TaskState::Disabled));
}
