//! The work-item auto-trigger queue drains FIFO after the outer mutation
//! persists, so a chain of `onEnabled -> request_start -> onWorkItemStateChanged
//! -> request_complete` callbacks can run an entire task to completion from
//! a single host call (spec §8, scenario 4; spec §4.4 auto-trigger queue).

mod support;

use std::sync::Arc;

use orchestrator_core::context::CallbackContext;
use orchestrator_core::element::{Activities, TaskCallback, WorkItemDefinition};
use orchestrator_core::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

fn on_enabled() -> TaskCallback {
    Arc::new(move |ctx: CallbackContext| {
        Box::pin(async move {
            let engine = ctx.exec.engine.clone();
            let exec = ctx.exec.clone();
            let workflow_id = ctx.workflow_id;
            let task_name = ctx.task_name.clone();
            let item_id = engine
                .initialize_work_item(exec.clone(), workflow_id, &task_name, Value::Null)
                .await?;
            engine.request_start_work_item(&exec, item_id, Value::Null);
            Ok(())
        })
    })
}

fn on_work_item_state_changed() -> TaskCallback {
    Arc::new(move |ctx: CallbackContext| {
        Box::pin(async move {
            if ctx.payload.get("to").and_then(|v| v.as_str()) == Some("started") {
                let work_item_id: Uuid = ctx
                    .payload
                    .get("workItemId")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                    .expect("workItemId");
                ctx.exec.engine.request_complete_work_item(&ctx.exec, work_item_id, Value::Null);
            }
            Ok(())
        })
    })
}

fn definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("self_driving", "v1")
        .start_condition("start")
        .end_condition("end")
        .connect_condition("start", ConnectTo::task("auto"))
        .task(
            "auto",
            WorkItemDefinition::new(),
            TaskOptions {
                activities: Activities {
                    on_enabled: Some(on_enabled()),
                    on_work_item_state_changed: Some(on_work_item_state_changed()),
                    ..Activities::default()
                },
                ..TaskOptions::default()
            },
        )
        .connect_task("auto", ConnectTo::condition("end"))
        .build()
        .expect("well-formed definition")
}

#[tokio::test]
async fn a_single_host_call_drains_the_whole_chain() {
    let engine = support::new_engine();
    engine.registry.register(definition());

    let workflow_id = engine
        .initialize_root_workflow(WorkflowVersion::new("self_driving", "v1"), json!({}))
        .await
        .expect("initialize");

    let states = engine.get_workflow_task_states(workflow_id).await.unwrap();
    assert_eq!(states.get("auto"), Some(&TaskState::Completed));
    assert_eq!(engine.get_workflow_state(workflow_id).await.unwrap(), WorkflowState::Completed);
}
