//! In-memory [`TransactionalStore`] used across the unit/integration
//! test suite, grounded on `everruns-durable`'s
//! `InMemoryWorkflowEventStore`: one `RwLock<HashMap<..>>` per entity,
//! no cross-entity transactionality beyond what a single lock acquisition
//! gives a single call (sufficient here because every engine operation
//! already serializes through `&ExecutionContext`, never interleaving two
//! mutations on the same workflow).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::instance::{
    AuditContext, ConditionInstance, MigrationRecord, ScheduledEntry, SubWorkflowInstance,
    TaskInstance, TaskState, TaskStatsDelta, TaskStatsShard, WorkItemInstance, WorkflowInstance,
};

use super::store::{StoreError, TransactionalStore, WorkflowPatch};

#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<Uuid, WorkflowInstance>>,
    conditions: RwLock<HashMap<(Uuid, String), ConditionInstance>>,
    tasks: RwLock<HashMap<(Uuid, String), TaskInstance>>,
    work_items: RwLock<HashMap<Uuid, WorkItemInstance>>,
    sub_workflows: RwLock<HashMap<Uuid, SubWorkflowInstance>>,
    shards: RwLock<HashMap<(Uuid, String, u64, u32), TaskStatsShard>>,
    scheduled: RwLock<HashMap<String, ScheduledEntry>>,
    migration_records: RwLock<HashMap<Uuid, MigrationRecord>>,
    audit_contexts: RwLock<HashMap<Uuid, AuditContext>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn work_item_count(&self) -> usize {
        self.work_items.read().len()
    }

    pub fn clear(&self) {
        self.workflows.write().clear();
        self.conditions.write().clear();
        self.tasks.write().clear();
        self.work_items.write().clear();
        self.sub_workflows.write().clear();
        self.shards.write().clear();
        self.scheduled.write().clear();
        self.migration_records.write().clear();
        self.audit_contexts.write().clear();
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn insert_workflow(&self, workflow: WorkflowInstance) -> Result<(), StoreError> {
        self.workflows.write().insert(workflow.id, workflow);
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowInstance, StoreError> {
        self.workflows
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(id))
    }

    async fn patch_workflow(&self, id: Uuid, patch: WorkflowPatch) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows.get_mut(&id).ok_or(StoreError::WorkflowNotFound(id))?;
        if let Some(state) = patch.state {
            workflow.state = state;
        }
        if let Some(payload) = patch.payload {
            workflow.payload = payload;
        }
        workflow.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list_child_workflows(&self, parent_workflow_id: Uuid) -> Result<Vec<WorkflowInstance>, StoreError> {
        Ok(self
            .workflows
            .read()
            .values()
            .filter(|w| w.parent.as_ref().map(|p| p.workflow_id) == Some(parent_workflow_id))
            .cloned()
            .collect())
    }

    async fn insert_condition(&self, condition: ConditionInstance) -> Result<(), StoreError> {
        self.conditions
            .write()
            .insert((condition.workflow_id, condition.name.clone()), condition);
        Ok(())
    }

    async fn get_condition(&self, workflow_id: Uuid, name: &str) -> Result<ConditionInstance, StoreError> {
        self.conditions
            .read()
            .get(&(workflow_id, name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::ConditionNotFound {
                workflow_id,
                name: name.to_string(),
            })
    }

    async fn set_condition_marking(&self, workflow_id: Uuid, name: &str, marking: u32) -> Result<(), StoreError> {
        let mut conditions = self.conditions.write();
        let condition = conditions
            .get_mut(&(workflow_id, name.to_string()))
            .ok_or_else(|| StoreError::ConditionNotFound {
                workflow_id,
                name: name.to_string(),
            })?;
        condition.marking = marking;
        Ok(())
    }

    async fn list_conditions(&self, workflow_id: Uuid) -> Result<Vec<ConditionInstance>, StoreError> {
        Ok(self
            .conditions
            .read()
            .values()
            .filter(|c| c.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn insert_task(&self, task: TaskInstance) -> Result<(), StoreError> {
        self.tasks.write().insert((task.workflow_id, task.name.clone()), task);
        Ok(())
    }

    async fn get_task(&self, workflow_id: Uuid, name: &str) -> Result<TaskInstance, StoreError> {
        self.tasks
            .read()
            .get(&(workflow_id, name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound {
                workflow_id,
                name: name.to_string(),
            })
    }

    async fn replace_task(&self, task: TaskInstance) -> Result<(), StoreError> {
        self.tasks.write().insert((task.workflow_id, task.name.clone()), task);
        Ok(())
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskInstance>, StoreError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn list_tasks_by_state(&self, workflow_id: Uuid, state: TaskState) -> Result<Vec<TaskInstance>, StoreError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| t.workflow_id == workflow_id && t.state == state)
            .cloned()
            .collect())
    }

    async fn insert_work_item(&self, item: WorkItemInstance) -> Result<(), StoreError> {
        self.work_items.write().insert(item.id, item);
        Ok(())
    }

    async fn get_work_item(&self, id: Uuid) -> Result<WorkItemInstance, StoreError> {
        self.work_items.read().get(&id).cloned().ok_or(StoreError::WorkItemNotFound(id))
    }

    async fn replace_work_item(&self, item: WorkItemInstance) -> Result<(), StoreError> {
        self.work_items.write().insert(item.id, item);
        Ok(())
    }

    async fn list_work_items_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<WorkItemInstance>, StoreError> {
        Ok(self
            .work_items
            .read()
            .values()
            .filter(|w| {
                w.parent.workflow_id == workflow_id
                    && w.parent.task_name == task_name
                    && w.parent.task_generation == generation
            })
            .cloned()
            .collect())
    }

    async fn insert_sub_workflow(&self, sub: SubWorkflowInstance) -> Result<(), StoreError> {
        self.sub_workflows.write().insert(sub.workflow_id, sub);
        Ok(())
    }

    async fn get_sub_workflow(&self, workflow_id: Uuid) -> Result<SubWorkflowInstance, StoreError> {
        self.sub_workflows
            .read()
            .get(&workflow_id)
            .cloned()
            .ok_or(StoreError::SubWorkflowNotFound(workflow_id))
    }

    async fn replace_sub_workflow(&self, sub: SubWorkflowInstance) -> Result<(), StoreError> {
        self.sub_workflows.write().insert(sub.workflow_id, sub);
        Ok(())
    }

    async fn list_sub_workflows_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<SubWorkflowInstance>, StoreError> {
        Ok(self
            .sub_workflows
            .read()
            .values()
            .filter(|s| {
                s.parent.workflow_id == workflow_id
                    && s.parent.task_name == task_name
                    && s.parent.task_generation == generation
            })
            .cloned()
            .collect())
    }

    async fn get_or_create_shard(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        shard_id: u32,
    ) -> Result<TaskStatsShard, StoreError> {
        let key = (workflow_id, task_name.to_string(), generation, shard_id);
        let mut shards = self.shards.write();
        Ok(shards
            .entry(key)
            .or_insert_with(|| TaskStatsShard::empty(workflow_id, task_name, generation, shard_id))
            .clone())
    }

    async fn apply_shard_delta(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        shard_id: u32,
        delta: TaskStatsDelta,
    ) -> Result<(), StoreError> {
        let key = (workflow_id, task_name.to_string(), generation, shard_id);
        let mut shards = self.shards.write();
        let shard = shards
            .entry(key)
            .or_insert_with(|| TaskStatsShard::empty(workflow_id, task_name, generation, shard_id));
        shard.stats.apply_delta(&delta);
        Ok(())
    }

    async fn list_shards(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<TaskStatsShard>, StoreError> {
        Ok(self
            .shards
            .read()
            .values()
            .filter(|s| s.workflow_id == workflow_id && s.task_name == task_name && s.generation == generation)
            .cloned()
            .collect())
    }

    async fn insert_scheduled(&self, entry: ScheduledEntry) -> Result<(), StoreError> {
        self.scheduled
            .write()
            .insert(entry.scheduled_function_id.clone(), entry);
        Ok(())
    }

    async fn list_scheduled_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<ScheduledEntry>, StoreError> {
        Ok(self
            .scheduled
            .read()
            .values()
            .filter(|e| e.key.matches_workflow(workflow_id))
            .cloned()
            .collect())
    }

    async fn delete_scheduled(&self, scheduled_function_id: &str) -> Result<(), StoreError> {
        self.scheduled.write().remove(scheduled_function_id);
        Ok(())
    }

    async fn insert_migration_record(&self, record: MigrationRecord) -> Result<(), StoreError> {
        self.migration_records.write().insert(record.to_workflow_id, record);
        Ok(())
    }

    async fn get_migration_record(&self, to_workflow_id: Uuid) -> Result<Option<MigrationRecord>, StoreError> {
        Ok(self.migration_records.read().get(&to_workflow_id).cloned())
    }

    async fn upsert_audit_context(&self, ctx: AuditContext) -> Result<(), StoreError> {
        self.audit_contexts.write().insert(ctx.workflow_id, ctx);
        Ok(())
    }

    async fn get_audit_context(&self, workflow_id: Uuid) -> Result<Option<AuditContext>, StoreError> {
        Ok(self.audit_contexts.read().get(&workflow_id).cloned())
    }
}
