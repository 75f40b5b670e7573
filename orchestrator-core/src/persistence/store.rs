//! `TransactionalStore`: the trait the engine reads and writes through.
//!
//! Spec §6 describes the host as a generic document store
//! (`db.insert/get/patch/replace/delete`, index-backed `db.query`). This
//! crate exposes that capability as one typed async method per entity
//! operation instead of a dynamic table/document API — the same
//! trade-off `everruns-durable`'s `WorkflowEventStore` makes — because a
//! systems-language engine benefits far more from compile-time checked
//! row shapes than from a generic `db.query(table).withIndex(...)`
//! builder a host would otherwise have to reimplement in Rust anyway.
//! Every method here corresponds to one of the indexed queries spec §6
//! names (e.g. tasks by `(workflowId, name, generation)` and by
//! `(workflowId, state)`; work items by
//! `(parent.workflowId, parent.taskName, parent.taskGeneration, state)`
//! and by `path`; `scheduledInitializations` by `key`).

use async_trait::async_trait;
use uuid::Uuid;

use crate::instance::{
    AuditContext, ConditionInstance, MigrationRecord, ScheduledEntry, SubWorkflowInstance,
    TaskInstance, TaskState, TaskStatsDelta, TaskStatsShard, WorkItemInstance, WorkItemState,
    WorkflowInstance, WorkflowState,
};

/// Errors surfaced by a [`TransactionalStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("condition not found: {workflow_id}/{name}")]
    ConditionNotFound { workflow_id: Uuid, name: String },

    #[error("task not found: {workflow_id}/{name}")]
    TaskNotFound { workflow_id: Uuid, name: String },

    #[error("work item not found: {0}")]
    WorkItemNotFound(Uuid),

    #[error("sub-workflow not found: {0}")]
    SubWorkflowNotFound(Uuid),

    #[error("concurrency conflict on {entity} {id}: row was modified concurrently")]
    ConcurrencyConflict { entity: &'static str, id: String },

    #[error("backend error: {0}")]
    Backend(String),
}

/// A partial update to a [`WorkflowInstance`] row (`db.patch`'s analogue
/// for the one entity the engine patches by individual field rather than
/// replacing wholesale).
#[derive(Debug, Clone, Default)]
pub struct WorkflowPatch {
    pub state: Option<WorkflowState>,
    pub payload: Option<serde_json::Value>,
}

#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------
    async fn insert_workflow(&self, workflow: WorkflowInstance) -> Result<(), StoreError>;
    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowInstance, StoreError>;
    async fn patch_workflow(&self, id: Uuid, patch: WorkflowPatch) -> Result<(), StoreError>;
    async fn list_child_workflows(&self, parent_workflow_id: Uuid) -> Result<Vec<WorkflowInstance>, StoreError>;

    // ------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------
    async fn insert_condition(&self, condition: ConditionInstance) -> Result<(), StoreError>;
    async fn get_condition(&self, workflow_id: Uuid, name: &str) -> Result<ConditionInstance, StoreError>;
    async fn set_condition_marking(&self, workflow_id: Uuid, name: &str, marking: u32) -> Result<(), StoreError>;
    async fn list_conditions(&self, workflow_id: Uuid) -> Result<Vec<ConditionInstance>, StoreError>;

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------
    async fn insert_task(&self, task: TaskInstance) -> Result<(), StoreError>;
    async fn get_task(&self, workflow_id: Uuid, name: &str) -> Result<TaskInstance, StoreError>;
    async fn replace_task(&self, task: TaskInstance) -> Result<(), StoreError>;
    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskInstance>, StoreError>;
    async fn list_tasks_by_state(
        &self,
        workflow_id: Uuid,
        state: TaskState,
    ) -> Result<Vec<TaskInstance>, StoreError>;

    // ------------------------------------------------------------------
    // Work items
    // ------------------------------------------------------------------
    async fn insert_work_item(&self, item: WorkItemInstance) -> Result<(), StoreError>;
    async fn get_work_item(&self, id: Uuid) -> Result<WorkItemInstance, StoreError>;
    async fn replace_work_item(&self, item: WorkItemInstance) -> Result<(), StoreError>;
    async fn list_work_items_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<WorkItemInstance>, StoreError>;
    async fn list_active_work_items_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<WorkItemInstance>, StoreError> {
        Ok(self
            .list_work_items_by_parent(workflow_id, task_name, generation)
            .await?
            .into_iter()
            .filter(|w| !matches!(w.state, WorkItemState::Completed | WorkItemState::Failed | WorkItemState::Canceled))
            .collect())
    }

    // ------------------------------------------------------------------
    // Sub-workflows
    // ------------------------------------------------------------------
    async fn insert_sub_workflow(&self, sub: SubWorkflowInstance) -> Result<(), StoreError>;
    async fn get_sub_workflow(&self, workflow_id: Uuid) -> Result<SubWorkflowInstance, StoreError>;
    async fn replace_sub_workflow(&self, sub: SubWorkflowInstance) -> Result<(), StoreError>;
    async fn list_sub_workflows_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<SubWorkflowInstance>, StoreError>;

    // ------------------------------------------------------------------
    // Stats shards
    // ------------------------------------------------------------------
    async fn get_or_create_shard(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        shard_id: u32,
    ) -> Result<TaskStatsShard, StoreError>;
    async fn apply_shard_delta(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        shard_id: u32,
        delta: TaskStatsDelta,
    ) -> Result<(), StoreError>;
    async fn list_shards(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<TaskStatsShard>, StoreError>;

    // ------------------------------------------------------------------
    // Scheduler reverse index
    // ------------------------------------------------------------------
    async fn insert_scheduled(&self, entry: ScheduledEntry) -> Result<(), StoreError>;
    async fn list_scheduled_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<ScheduledEntry>, StoreError>;
    async fn delete_scheduled(&self, scheduled_function_id: &str) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------
    async fn insert_migration_record(&self, record: MigrationRecord) -> Result<(), StoreError>;
    async fn get_migration_record(&self, to_workflow_id: Uuid) -> Result<Option<MigrationRecord>, StoreError>;

    // ------------------------------------------------------------------
    // Audit contexts
    // ------------------------------------------------------------------
    async fn upsert_audit_context(&self, ctx: AuditContext) -> Result<(), StoreError>;
    async fn get_audit_context(&self, workflow_id: Uuid) -> Result<Option<AuditContext>, StoreError>;
}
