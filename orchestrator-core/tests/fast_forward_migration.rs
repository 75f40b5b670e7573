//! Fast-forward migration (spec §8, scenario 6): a migrator seeds a new
//! workflow version's state from an existing instance without firing
//! normal lifecycle activities, and records a `MigrationRecord` linking
//! the two (spec §4.7, §6 `initializeRootWorkflowFastForwarded`).

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use orchestrator_core::element::{
    MigrationCallbackContext, MigrationDefinition, MigrationOutcome, WorkItemDefinition,
    WorkflowActivities,
};
use orchestrator_core::instance::{WorkItemInstance, WorkItemParent};
use orchestrator_core::prelude::*;
use serde_json::json;

fn source_definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("onboarding", "v1")
        .start_condition("start")
        .end_condition("end")
        .connect_condition("start", ConnectTo::task("review"))
        .task("review", WorkItemDefinition::new(), TaskOptions::default())
        .connect_task("review", ConnectTo::condition("end"))
        .build()
        .expect("well-formed source definition")
}

fn target_definition(on_initialized_called: Arc<AtomicBool>, migration: MigrationDefinition) -> WorkflowDefinition {
    let flag = on_initialized_called;
    WorkflowDefinitionBuilder::new("onboarding", "v2")
        .with_workflow_activities(WorkflowActivities {
            on_initialized: Some(Arc::new(move |_ctx| {
                let flag = flag.clone();
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
            })),
            ..WorkflowActivities::default()
        })
        .start_condition("start")
        .end_condition("end")
        .connect_condition("start", ConnectTo::task("review"))
        .task("review", WorkItemDefinition::new(), TaskOptions::default())
        .connect_task("review", ConnectTo::condition("end"))
        .with_migration(migration)
        .build()
        .expect("well-formed target definition")
}

#[tokio::test]
async fn fast_forward_skips_lifecycle_callbacks_and_records_migration() {
    let (engine, store) = support::new_engine_with_store();
    engine.registry.register(source_definition());

    let source_id = engine
        .initialize_root_workflow(WorkflowVersion::new("onboarding", "v1"), json!({}))
        .await
        .expect("initialize source");

    let item_id = engine.initialize_work_item(source_id, "review", json!({})).await.unwrap();
    engine.start_work_item(item_id, serde_json::Value::Null).await.unwrap();
    // Source left with "review" started and its work item still open,
    // mirroring spec §8 scenario 6's w1-completed/w2-initialized shape
    // (here a single in-flight work item instead of two sibling tasks).
    let source_states = engine.get_workflow_task_states(source_id).await.unwrap();
    assert_eq!(source_states.get("review"), Some(&TaskState::Started));

    let on_initialized_called = Arc::new(AtomicBool::new(false));
    // No task migrators registered: every task defaults to the
    // "fastForward" outcome (spec §4.7), copying state/generation as-is.
    let migration = MigrationDefinition {
        initializer: None,
        finalizer: None,
        task_migrators: std::collections::HashMap::new(),
    };
    engine.registry.register(target_definition(on_initialized_called.clone(), migration));

    let target_id = engine
        .initialize_root_workflow_fast_forwarded(
            WorkflowVersion::new("onboarding", "v2"),
            source_id,
            json!({}),
        )
        .await
        .expect("fast-forward");

    assert_ne!(target_id, source_id);
    assert!(
        !on_initialized_called.load(Ordering::SeqCst),
        "fast-forward must not fire onInitialized on the new root workflow"
    );

    let target_states = engine.get_workflow_task_states(target_id).await.unwrap();
    assert_eq!(target_states.get("review"), Some(&TaskState::Started));

    let record = store
        .get_migration_record(target_id)
        .await
        .expect("store read")
        .expect("migration record must exist");
    assert_eq!(record.from_workflow_id, source_id);
    assert_eq!(record.to_workflow_id, target_id);
}

#[tokio::test]
async fn migrator_returning_fast_forward_while_seeding_a_child_is_rejected() {
    let (engine, _store) = support::new_engine_with_store();
    engine.registry.register(source_definition());

    let source_id = engine
        .initialize_root_workflow(WorkflowVersion::new("onboarding", "v1"), json!({}))
        .await
        .expect("initialize source");
    let item_id = engine.initialize_work_item(source_id, "review", json!({})).await.unwrap();
    engine.start_work_item(item_id, serde_json::Value::Null).await.unwrap();

    let on_initialized_called = Arc::new(AtomicBool::new(false));
    let mut task_migrators = std::collections::HashMap::new();
    // A misbehaving migrator: confirms "fastForward" but also plants a
    // work item of its own under the target task's (copied) generation,
    // which spec §9 resolves as a `ConstraintViolation`.
    let review_migrator: orchestrator_core::element::TaskMigratorFn =
        Arc::new(move |ctx: MigrationCallbackContext| {
            Box::pin(async move {
                let source_task = ctx.exec.store.get_task(ctx.from_workflow_id, "review").await?;
                let parent = WorkItemParent {
                    workflow_id: ctx.to_workflow_id,
                    task_name: "review".to_string(),
                    task_generation: source_task.generation,
                };
                let item = WorkItemInstance::new(parent, vec![ctx.to_workflow_id], serde_json::Value::Null, chrono::Utc::now());
                ctx.exec.store.insert_work_item(item).await?;
                Ok(MigrationOutcome::FastForward)
            })
        });
    task_migrators.insert("review".to_string(), review_migrator);
    let migration = MigrationDefinition {
        initializer: None,
        finalizer: None,
        task_migrators,
    };
    engine.registry.register(target_definition(on_initialized_called, migration));

    let result = engine
        .initialize_root_workflow_fast_forwarded(
            WorkflowVersion::new("onboarding", "v2"),
            source_id,
            json!({}),
        )
        .await;

    assert!(matches!(result, Err(OrchestratorError::ConstraintViolation(_))));
}
