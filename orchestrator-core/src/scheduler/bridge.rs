use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::instance::{ScheduledEntry, ScheduledKey};
use crate::persistence::{StoreError, TransactionalStore};

use super::handle::{ScheduledFunction, SchedulerHandle};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown scheduled function: {0}")]
    UnknownScheduledFunction(String),

    #[error("scheduler backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The scheduler seam `ExecutionContext` and `EngineHandle::register_scheduled`
/// call through. Owns the reverse index from spec §4.10: every delayed
/// function the engine registers is remembered by `{workflow, task/generation,
/// work item}` key so a cancellation region can find and cancel it without
/// the host exposing a "cancel everything for this workflow" primitive of
/// its own. [`DefaultSchedulerBridge`] is the one implementation this
/// crate ships, wrapping a host [`SchedulerHandle`].
#[async_trait]
pub trait SchedulerBridge: Send + Sync + 'static {
    async fn schedule_after(
        &self,
        delay: Duration,
        key: ScheduledKey,
        function: ScheduledFunction,
    ) -> Result<String, SchedulerError>;

    async fn cancel_for_workflow(&self, workflow_id: Uuid) -> Result<(), SchedulerError>;

    async fn cancel_for_task(&self, workflow_id: Uuid, task_name: &str) -> Result<(), SchedulerError>;
}

pub struct DefaultSchedulerBridge {
    handle: Arc<dyn SchedulerHandle>,
    store: Arc<dyn TransactionalStore>,
}

impl DefaultSchedulerBridge {
    pub fn new(handle: Arc<dyn SchedulerHandle>, store: Arc<dyn TransactionalStore>) -> Self {
        Self { handle, store }
    }

    async fn cancel_entry(&self, scheduled_function_id: &str) -> Result<(), SchedulerError> {
        match self.handle.cancel(scheduled_function_id).await {
            Ok(()) => {}
            Err(SchedulerError::UnknownScheduledFunction(id)) => {
                warn!(scheduled_function_id = %id, "scheduled function already gone, treating cancellation as no-op");
            }
            Err(other) => return Err(other),
        }
        self.store.delete_scheduled(scheduled_function_id).await?;
        Ok(())
    }
}

#[async_trait]
impl SchedulerBridge for DefaultSchedulerBridge {
    /// `scheduler.after(delayMs, fn)` plus the `registerScheduled` row
    /// insertion, done together because spec §4.10 requires registration
    /// to be ordered within the same mutation as the call that produced
    /// the id.
    #[instrument(skip(self, function))]
    async fn schedule_after(
        &self,
        delay: Duration,
        key: ScheduledKey,
        function: ScheduledFunction,
    ) -> Result<String, SchedulerError> {
        let scheduled_function_id = self.handle.after(delay, function).await?;
        let entry = ScheduledEntry::new(scheduled_function_id.clone(), key, chrono::Utc::now());
        self.store.insert_scheduled(entry).await?;
        info!(scheduled_function_id = %scheduled_function_id, "registered scheduled function");
        Ok(scheduled_function_id)
    }

    /// Cancels every scheduled function registered for `workflow_id`,
    /// tolerating "already fired" per spec §4.10's ordering guarantee.
    #[instrument(skip(self))]
    async fn cancel_for_workflow(&self, workflow_id: Uuid) -> Result<(), SchedulerError> {
        let entries = self.store.list_scheduled_for_workflow(workflow_id).await?;
        for entry in entries {
            self.cancel_entry(&entry.scheduled_function_id).await?;
        }
        Ok(())
    }

    /// Cancels every scheduled function registered under the task's key
    /// prefix, regardless of generation — used by cancellation-region
    /// processing (spec §4.6) when a task's cancellation set includes
    /// itself or peers.
    #[instrument(skip(self))]
    async fn cancel_for_task(&self, workflow_id: Uuid, task_name: &str) -> Result<(), SchedulerError> {
        let entries = self.store.list_scheduled_for_workflow(workflow_id).await?;
        for entry in entries {
            if entry.key.matches_task_prefix(workflow_id, task_name) {
                self.cancel_entry(&entry.scheduled_function_id).await?;
            }
        }
        Ok(())
    }
}
