//! The migration manager (spec §4.7, §6 `initializeRootWorkflowFastForwarded`):
//! spins up a fresh instance of a target workflow version in
//! [`ExecutionMode::FastForward`], replays the migration's initializer
//! and per-task migrators to seed its state from an existing instance
//! without firing `onInitialized`/`onStarted`, then lets the instance run
//! on as an ordinary one.
//!
//! Grounded on the same "replay without side effects" shape
//! `everruns-durable`'s executor uses for event-sourced recovery, but
//! here the replay source is a sibling instance rather than the
//! instance's own event log — there is no event log in this engine
//! (spec §9: "no event sourcing").

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::context::{ExecutionContext, ExecutionMode};
use crate::element::{MigrationCallbackContext, MigrationOutcome, WorkflowVersion};
use crate::error::OrchestratorError;
use crate::instance::{AuditContext, MigrationRecord};

use super::core::Engine;

impl Engine {
    /// Creates `to_version`'s fresh instance, seeds it from
    /// `from_workflow_id`'s current state via the target definition's
    /// [`crate::element::MigrationDefinition`], and records the
    /// [`MigrationRecord`] linking the two (spec §6).
    pub async fn initialize_root_workflow_fast_forwarded(
        self: &Arc<Self>,
        to_version: WorkflowVersion,
        from_workflow_id: Uuid,
        payload: Value,
    ) -> Result<Uuid, OrchestratorError> {
        let to_def = self.registry.get(&to_version)?;
        let ctx = self.new_root_context(ExecutionMode::FastForward);
        let workflow_id = Uuid::now_v7();
        let audit_seed = AuditContext::root(workflow_id, workflow_id.to_string());

        self.initialize_workflow_logic(&ctx, &to_def, workflow_id, None, Vec::new(), payload.clone(), audit_seed)
            .await?;
        // Mirror the source instance's net state wholesale before any
        // per-task override runs, so a "continue" migrator's `tryEnableTask`
        // call sees the same tokens the source instance actually carries,
        // and a "fastForward" task's downstream conditions stay consistent
        // with its copied terminal state.
        self.copy_condition_markings(from_workflow_id, workflow_id, &to_def).await?;

        let migration = to_def.migration.as_ref().ok_or_else(|| {
            OrchestratorError::MigrationError(format!(
                "workflow version '{to_version}' has no migration definition"
            ))
        })?;

        let base_ctx = |task_name: Option<&str>| MigrationCallbackContext {
            exec: ctx.clone(),
            from_workflow_id,
            to_workflow_id: workflow_id,
            task_name: task_name.map(str::to_string),
            payload: payload.clone(),
        };

        if let Some(initializer) = &migration.initializer {
            initializer(base_ctx(None)).await?;
        }

        let mut task_names: Vec<&String> = to_def.tasks.keys().collect();
        task_names.sort();

        for task_name in task_names {
            let outcome = match migration.task_migrators.get(task_name) {
                Some(migrator) => Some(migrator(base_ctx(Some(task_name))).await?),
                None => None,
            };

            match outcome {
                Some(MigrationOutcome::FastForward) | None => {
                    self.fast_forward_task_from_source(&ctx, from_workflow_id, workflow_id, task_name)
                        .await?;
                    let generation = self.store.get_task(workflow_id, task_name).await?.generation;
                    if !self
                        .store
                        .list_work_items_by_parent(workflow_id, task_name, generation)
                        .await?
                        .is_empty()
                        || !self
                            .store
                            .list_sub_workflows_by_parent(workflow_id, task_name, generation)
                            .await?
                            .is_empty()
                    {
                        return Err(OrchestratorError::ConstraintViolation(format!(
                            "task migrator for '{task_name}' returned fastForward but also initialized a child"
                        )));
                    }
                }
                Some(MigrationOutcome::Continue) => {
                    self.try_enable_task(&ctx, &to_def, workflow_id, task_name).await?;
                }
            }
        }

        if let Some(finalizer) = &migration.finalizer {
            finalizer(base_ctx(None)).await?;
        }

        self.store
            .insert_migration_record(MigrationRecord::new(from_workflow_id, workflow_id, Utc::now()))
            .await?;

        self.drain_auto_trigger_queue(&ctx).await?;
        self.maybe_complete_workflow(&ctx, &to_def, workflow_id).await?;
        Ok(workflow_id)
    }

    /// Copies `task_name`'s state and generation straight from the source
    /// instance onto the new one, the default bridging behavior for a
    /// task with no migrator, or whose migrator explicitly confirmed
    /// `"fastForward"` (spec §4.7: "placed in a terminal state consistent
    /// with the source instance").
    async fn fast_forward_task_from_source(
        &self,
        _ctx: &ExecutionContext,
        from_workflow_id: Uuid,
        to_workflow_id: Uuid,
        task_name: &str,
    ) -> Result<(), OrchestratorError> {
        let source = self.store.get_task(from_workflow_id, task_name).await?;
        let mut target = self.store.get_task(to_workflow_id, task_name).await?;
        target.state = source.state;
        target.generation = source.generation;
        target.realized_path = source.realized_path.clone();
        self.store.replace_task(target).await?;
        Ok(())
    }

    /// Copies every condition's marking from the source instance onto the
    /// target, the assumption a `"continue"` migrator relies on when the
    /// two definitions share topology (spec §4.7: migrators bridge
    /// topology differences themselves when they don't).
    async fn copy_condition_markings(
        &self,
        from_workflow_id: Uuid,
        to_workflow_id: Uuid,
        to_def: &crate::element::WorkflowDefinition,
    ) -> Result<(), OrchestratorError> {
        for condition_def in to_def.conditions.values() {
            if let Ok(source) = self.store.get_condition(from_workflow_id, &condition_def.name).await {
                self.store
                    .set_condition_marking(to_workflow_id, &condition_def.name, source.marking)
                    .await?;
            }
        }
        Ok(())
    }
}
