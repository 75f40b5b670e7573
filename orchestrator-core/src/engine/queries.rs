//! The read-only query surface (spec §6 "Queries"/"Helpers"): thin
//! wrappers over [`crate::persistence::TransactionalStore`] reads and
//! the sharded stats aggregator, with no engine-state mutation.

use std::collections::HashMap;

use uuid::Uuid;

use crate::element::WorkflowStructure;
use crate::error::OrchestratorError;
use crate::instance::{TaskState, TaskStats, WorkItemState, WorkflowState};

use super::core::Engine;

/// `getWorkflowTaskStates`'s return shape: every task instance currently
/// known for a workflow, by name.
pub type WorkflowTaskStates = HashMap<String, TaskState>;

impl Engine {
    pub async fn get_workflow_state(&self, workflow_id: Uuid) -> Result<WorkflowState, OrchestratorError> {
        Ok(self.store.get_workflow(workflow_id).await?.state)
    }

    pub async fn get_work_item_state(&self, work_item_id: Uuid) -> Result<WorkItemState, OrchestratorError> {
        Ok(self.store.get_work_item(work_item_id).await?.state)
    }

    pub async fn get_workflow_task_states(
        &self,
        workflow_id: Uuid,
    ) -> Result<WorkflowTaskStates, OrchestratorError> {
        Ok(self
            .store
            .list_tasks(workflow_id)
            .await?
            .into_iter()
            .map(|t| (t.name, t.state))
            .collect())
    }

    /// Static graph description of a registered workflow version (spec §6
    /// `getWorkflowStructure`), delegating to
    /// [`crate::element::WorkflowDefinition::structure`].
    pub async fn get_workflow_structure(
        &self,
        version: &crate::element::WorkflowVersion,
    ) -> Result<WorkflowStructure, OrchestratorError> {
        Ok(self.registry.get(version)?.structure())
    }

    pub async fn get_aggregated_task_stats(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<TaskStats, OrchestratorError> {
        super::stats::aggregate(&*self.store, workflow_id, task_name, generation).await
    }

    /// Walks up a workflow's `parent` chain to the root id, consulting
    /// [`crate::instance::WorkflowInstance::root_id`] via its own
    /// `realized_path` (empty for a root instance, spec §3).
    pub async fn get_root_workflow_id(&self, workflow_id: Uuid) -> Result<Uuid, OrchestratorError> {
        Ok(self.store.get_workflow(workflow_id).await?.root_id())
    }

    pub async fn get_workflow_id_for_work_item(&self, work_item_id: Uuid) -> Result<Uuid, OrchestratorError> {
        Ok(self.store.get_work_item(work_item_id).await?.parent.workflow_id)
    }

    pub async fn get_root_workflow_id_for_work_item(
        &self,
        work_item_id: Uuid,
    ) -> Result<Uuid, OrchestratorError> {
        Ok(self.store.get_work_item(work_item_id).await?.root_workflow_id())
    }
}
