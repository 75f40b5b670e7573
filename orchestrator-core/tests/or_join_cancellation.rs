//! An OR-join enables once its only still-unmarked incoming path is dead
//! (spec §8, scenario 3 — the classic "first branch to finish cancels the
//! other" discriminator built on a cancellation region plus the E2WFOJNet
//! reachability analysis in `orjoin`).

mod support;

use orchestrator_core::element::{JoinType, WorkItemDefinition};
use orchestrator_core::prelude::*;
use serde_json::json;

fn definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("discriminator", "v1")
        .start_condition("start")
        .end_condition("end")
        .condition("cond_a")
        .condition("cond_b")
        .condition("cond_x")
        .condition("cond_y")
        .connect_condition("start", ConnectTo::task("gate"))
        .dummy_task("gate", TaskOptions::default())
        .connect_task("gate", ConnectTo::conditions(["cond_a", "cond_b"]))
        .task("branch_x", WorkItemDefinition::new(), TaskOptions::default())
        .task("branch_y", WorkItemDefinition::new(), TaskOptions::default())
        .connect_condition("cond_a", ConnectTo::task("branch_x"))
        .connect_condition("cond_b", ConnectTo::task("branch_y"))
        .connect_task("branch_x", ConnectTo::condition("cond_x"))
        .connect_task("branch_y", ConnectTo::condition("cond_y"))
        .with_cancellation_region(
            "branch_x",
            orchestrator_core::element::CancellationRegion::new().with_tasks(["branch_y"]),
        )
        .dummy_task(
            "join",
            TaskOptions {
                join_type: JoinType::Or,
                ..TaskOptions::default()
            },
        )
        .connect_condition("cond_x", ConnectTo::task("join"))
        .connect_condition("cond_y", ConnectTo::task("join"))
        .connect_task("join", ConnectTo::condition("end"))
        .build()
        .expect("well-formed definition")
}

#[tokio::test]
async fn or_join_fires_once_the_other_branch_is_canceled() {
    let engine = support::new_engine();
    engine.registry.register(definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("discriminator", "v1"), json!({}))
        .await
        .unwrap();

    // Both branches enabled off the AND-split gate; the OR-join is not yet
    // satisfied because both of its incoming conditions are still reachable.
    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("branch_x"), Some(&TaskState::Enabled));
    assert_eq!(states.get("branch_y"), Some(&TaskState::Enabled));
    assert_eq!(states.get("join"), Some(&TaskState::Disabled));

    let item_id = engine.initialize_work_item(workflow_id, "branch_x", json!({})).await.unwrap();
    engine.start_work_item(item_id, serde_json::Value::Null).await.unwrap();
    // Completing branch_x deposits on cond_x, then fires its cancellation
    // region, force-canceling branch_y before it can ever deposit on cond_y.
    engine.complete_work_item(item_id, json!({})).await.unwrap();

    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("branch_x"), Some(&TaskState::Completed));
    assert_eq!(states.get("branch_y"), Some(&TaskState::Canceled));
    // cond_y can never be marked again now that branch_y is dead, so the
    // OR-join's reachability analysis lets it fire on cond_x alone.
    assert_eq!(states.get("join"), Some(&TaskState::Completed));
    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Completed);
}
