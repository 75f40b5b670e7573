//! PostgreSQL implementation of [`TransactionalStore`].
//!
//! JSONB-backed, mirroring `everruns-durable`'s
//! `PostgresWorkflowEventStore`: each table keeps a handful of indexed
//! columns for the lookups spec §6 names, plus a `doc JSONB` column
//! holding the full serialized instance row, so adding a field to e.g.
//! [`WorkItemInstance`] never requires a migration. Table names follow
//! spec §6's persisted-state layout (`workflows`, `tasks`, `conditions`,
//! `work_items`, `task_stats_shards`, `scheduled_initializations`,
//! `migration`, `audit_contexts`).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::instance::{
    AuditContext, ConditionInstance, MigrationRecord, ScheduledEntry, SubWorkflowInstance,
    TaskInstance, TaskState, TaskStatsDelta, TaskStatsShard, WorkItemInstance, WorkflowInstance,
};

use super::store::{StoreError, TransactionalStore, WorkflowPatch};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    error!("orchestrator store backend error: {e}");
    StoreError::Backend(e.to_string())
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    #[instrument(skip(self, workflow))]
    async fn insert_workflow(&self, workflow: WorkflowInstance) -> Result<(), StoreError> {
        let doc = serialize(&workflow)?;
        sqlx::query(
            r#"
            INSERT INTO workflows (id, workflow_name, version_name, parent_workflow_id, state, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.workflow_name)
        .bind(&workflow.version_name)
        .bind(workflow.parent.as_ref().map(|p| p.workflow_id))
        .bind(serde_json::to_string(&workflow.state).unwrap_or_default())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        debug!(workflow_id = %workflow.id, "inserted workflow");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowInstance, StoreError> {
        let row = sqlx::query("SELECT doc FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::WorkflowNotFound(id))?;
        deserialize(row.get::<serde_json::Value, _>("doc"))
    }

    #[instrument(skip(self, patch))]
    async fn patch_workflow(&self, id: Uuid, patch: WorkflowPatch) -> Result<(), StoreError> {
        let mut workflow = self.get_workflow(id).await?;
        if let Some(state) = patch.state {
            workflow.state = state;
        }
        if let Some(payload) = patch.payload {
            workflow.payload = payload;
        }
        workflow.updated_at = chrono::Utc::now();
        let doc = serialize(&workflow)?;
        sqlx::query("UPDATE workflows SET state = $2, doc = $3 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_string(&workflow.state).unwrap_or_default())
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_child_workflows(&self, parent_workflow_id: Uuid) -> Result<Vec<WorkflowInstance>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM workflows WHERE parent_workflow_id = $1")
            .bind(parent_workflow_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self, condition))]
    async fn insert_condition(&self, condition: ConditionInstance) -> Result<(), StoreError> {
        let doc = serialize(&condition)?;
        sqlx::query(
            r#"
            INSERT INTO conditions (workflow_id, name, marking, doc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (workflow_id, name) DO UPDATE SET marking = excluded.marking, doc = excluded.doc
            "#,
        )
        .bind(condition.workflow_id)
        .bind(&condition.name)
        .bind(condition.marking as i32)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_condition(&self, workflow_id: Uuid, name: &str) -> Result<ConditionInstance, StoreError> {
        let row = sqlx::query("SELECT doc FROM conditions WHERE workflow_id = $1 AND name = $2")
            .bind(workflow_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::ConditionNotFound {
                workflow_id,
                name: name.to_string(),
            })?;
        deserialize(row.get::<serde_json::Value, _>("doc"))
    }

    #[instrument(skip(self))]
    async fn set_condition_marking(&self, workflow_id: Uuid, name: &str, marking: u32) -> Result<(), StoreError> {
        let mut condition = self.get_condition(workflow_id, name).await?;
        condition.marking = marking;
        self.insert_condition(condition).await
    }

    #[instrument(skip(self))]
    async fn list_conditions(&self, workflow_id: Uuid) -> Result<Vec<ConditionInstance>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM conditions WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self, task))]
    async fn insert_task(&self, task: TaskInstance) -> Result<(), StoreError> {
        let doc = serialize(&task)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (workflow_id, name, generation, state, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (workflow_id, name) DO UPDATE
                SET generation = excluded.generation, state = excluded.state, doc = excluded.doc
            "#,
        )
        .bind(task.workflow_id)
        .bind(&task.name)
        .bind(task.generation as i64)
        .bind(serde_json::to_string(&task.state).unwrap_or_default())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_task(&self, workflow_id: Uuid, name: &str) -> Result<TaskInstance, StoreError> {
        let row = sqlx::query("SELECT doc FROM tasks WHERE workflow_id = $1 AND name = $2")
            .bind(workflow_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::TaskNotFound {
                workflow_id,
                name: name.to_string(),
            })?;
        deserialize(row.get::<serde_json::Value, _>("doc"))
    }

    async fn replace_task(&self, task: TaskInstance) -> Result<(), StoreError> {
        self.insert_task(task).await
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, workflow_id: Uuid) -> Result<Vec<TaskInstance>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM tasks WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self))]
    async fn list_tasks_by_state(&self, workflow_id: Uuid, state: TaskState) -> Result<Vec<TaskInstance>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM tasks WHERE workflow_id = $1 AND state = $2")
            .bind(workflow_id)
            .bind(serde_json::to_string(&state).unwrap_or_default())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self, item))]
    async fn insert_work_item(&self, item: WorkItemInstance) -> Result<(), StoreError> {
        let doc = serialize(&item)?;
        sqlx::query(
            r#"
            INSERT INTO work_items (id, workflow_id, task_name, task_generation, state, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET state = excluded.state, doc = excluded.doc
            "#,
        )
        .bind(item.id)
        .bind(item.parent.workflow_id)
        .bind(&item.parent.task_name)
        .bind(item.parent.task_generation as i64)
        .bind(serde_json::to_string(&item.state).unwrap_or_default())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_work_item(&self, id: Uuid) -> Result<WorkItemInstance, StoreError> {
        let row = sqlx::query("SELECT doc FROM work_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::WorkItemNotFound(id))?;
        deserialize(row.get::<serde_json::Value, _>("doc"))
    }

    async fn replace_work_item(&self, item: WorkItemInstance) -> Result<(), StoreError> {
        self.insert_work_item(item).await
    }

    #[instrument(skip(self))]
    async fn list_work_items_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<WorkItemInstance>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM work_items WHERE workflow_id = $1 AND task_name = $2 AND task_generation = $3",
        )
        .bind(workflow_id)
        .bind(task_name)
        .bind(generation as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self, sub))]
    async fn insert_sub_workflow(&self, sub: SubWorkflowInstance) -> Result<(), StoreError> {
        let doc = serialize(&sub)?;
        sqlx::query(
            r#"
            INSERT INTO sub_workflows (workflow_id, parent_workflow_id, task_name, task_generation, state, doc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (workflow_id) DO UPDATE SET state = excluded.state, doc = excluded.doc
            "#,
        )
        .bind(sub.workflow_id)
        .bind(sub.parent.workflow_id)
        .bind(&sub.parent.task_name)
        .bind(sub.parent.task_generation as i64)
        .bind(serde_json::to_string(&sub.state).unwrap_or_default())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_sub_workflow(&self, workflow_id: Uuid) -> Result<SubWorkflowInstance, StoreError> {
        let row = sqlx::query("SELECT doc FROM sub_workflows WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::SubWorkflowNotFound(workflow_id))?;
        deserialize(row.get::<serde_json::Value, _>("doc"))
    }

    async fn replace_sub_workflow(&self, sub: SubWorkflowInstance) -> Result<(), StoreError> {
        self.insert_sub_workflow(sub).await
    }

    #[instrument(skip(self))]
    async fn list_sub_workflows_by_parent(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<SubWorkflowInstance>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM sub_workflows WHERE parent_workflow_id = $1 AND task_name = $2 AND task_generation = $3",
        )
        .bind(workflow_id)
        .bind(task_name)
        .bind(generation as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_or_create_shard(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        shard_id: u32,
    ) -> Result<TaskStatsShard, StoreError> {
        let existing = sqlx::query(
            "SELECT doc FROM task_stats_shards WHERE workflow_id = $1 AND task_name = $2 AND generation = $3 AND shard_id = $4",
        )
        .bind(workflow_id)
        .bind(task_name)
        .bind(generation as i64)
        .bind(shard_id as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = existing {
            return deserialize(row.get::<serde_json::Value, _>("doc"));
        }

        let shard = TaskStatsShard::empty(workflow_id, task_name, generation, shard_id);
        let doc = serialize(&shard)?;
        sqlx::query(
            r#"
            INSERT INTO task_stats_shards (workflow_id, task_name, generation, shard_id, doc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (workflow_id, task_name, generation, shard_id) DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(task_name)
        .bind(generation as i64)
        .bind(shard_id as i32)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(shard)
    }

    #[instrument(skip(self, delta))]
    async fn apply_shard_delta(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        shard_id: u32,
        delta: TaskStatsDelta,
    ) -> Result<(), StoreError> {
        let mut shard = self
            .get_or_create_shard(workflow_id, task_name, generation, shard_id)
            .await?;
        shard.stats.apply_delta(&delta);
        let doc = serialize(&shard)?;
        sqlx::query(
            r#"
            UPDATE task_stats_shards SET doc = $5
            WHERE workflow_id = $1 AND task_name = $2 AND generation = $3 AND shard_id = $4
            "#,
        )
        .bind(workflow_id)
        .bind(task_name)
        .bind(generation as i64)
        .bind(shard_id as i32)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_shards(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
    ) -> Result<Vec<TaskStatsShard>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM task_stats_shards WHERE workflow_id = $1 AND task_name = $2 AND generation = $3",
        )
        .bind(workflow_id)
        .bind(task_name)
        .bind(generation as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    #[instrument(skip(self, entry))]
    async fn insert_scheduled(&self, entry: ScheduledEntry) -> Result<(), StoreError> {
        let doc = serialize(&entry)?;
        sqlx::query(
            r#"
            INSERT INTO scheduled_initializations (scheduled_function_id, key, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (scheduled_function_id) DO UPDATE SET doc = excluded.doc
            "#,
        )
        .bind(&entry.scheduled_function_id)
        .bind(entry.key.as_string())
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_scheduled_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<ScheduledEntry>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM scheduled_initializations WHERE key LIKE $1")
            .bind(format!("%{workflow_id}%"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let entries: Vec<ScheduledEntry> = rows
            .into_iter()
            .map(|r| deserialize(r.get::<serde_json::Value, _>("doc")))
            .collect::<Result<_, _>>()?;
        Ok(entries
            .into_iter()
            .filter(|e| e.key.matches_workflow(workflow_id))
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete_scheduled(&self, scheduled_function_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduled_initializations WHERE scheduled_function_id = $1")
            .bind(scheduled_function_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self, record))]
    async fn insert_migration_record(&self, record: MigrationRecord) -> Result<(), StoreError> {
        let doc = serialize(&record)?;
        sqlx::query(
            r#"
            INSERT INTO migration (from_workflow_id, to_workflow_id, doc)
            VALUES ($1, $2, $3)
            ON CONFLICT (to_workflow_id) DO UPDATE SET doc = excluded.doc
            "#,
        )
        .bind(record.from_workflow_id)
        .bind(record.to_workflow_id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_migration_record(&self, to_workflow_id: Uuid) -> Result<Option<MigrationRecord>, StoreError> {
        let row = sqlx::query("SELECT doc FROM migration WHERE to_workflow_id = $1")
            .bind(to_workflow_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| deserialize(r.get::<serde_json::Value, _>("doc"))).transpose()
    }

    #[instrument(skip(self, ctx))]
    async fn upsert_audit_context(&self, ctx: AuditContext) -> Result<(), StoreError> {
        let doc = serialize(&ctx)?;
        sqlx::query(
            r#"
            INSERT INTO audit_contexts (workflow_id, doc)
            VALUES ($1, $2)
            ON CONFLICT (workflow_id) DO UPDATE SET doc = excluded.doc
            "#,
        )
        .bind(ctx.workflow_id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_audit_context(&self, workflow_id: Uuid) -> Result<Option<AuditContext>, StoreError> {
        let row = sqlx::query("SELECT doc FROM audit_contexts WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| deserialize(r.get::<serde_json::Value, _>("doc"))).transpose()
    }
}
