use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::bridge::SchedulerError;

/// The function a scheduled callback invokes once its delay elapses.
/// Boxed rather than generic, following `TaskCallback`/`MigrationInitializerFn`'s
/// lead: the host hands the engine a closure, the engine never needs to
/// know its concrete type.
pub type ScheduledFunction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), SchedulerError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScheduledState {
    Pending,
    Executing,
    Completed,
    Failed,
    Canceled,
}

/// Host-provided delayed-execution primitive: `scheduler.after`/`scheduler.cancel`/
/// `system.get` from spec §6.
#[async_trait]
pub trait SchedulerHandle: Send + Sync + 'static {
    async fn after(&self, delay: Duration, function: ScheduledFunction) -> Result<String, SchedulerError>;
    async fn cancel(&self, scheduled_function_id: &str) -> Result<(), SchedulerError>;
    async fn state(&self, scheduled_function_id: &str) -> Result<ScheduledState, SchedulerError>;
}

/// In-process [`SchedulerHandle`] backed by `tokio::time::sleep`, used by
/// the test suite and by `InMemoryStore`-backed demos. Mirrors
/// `reliability::timeout`'s preference for real `tokio` timers over a
/// simulated clock.
#[derive(Default)]
pub struct InMemorySchedulerHandle {
    states: Arc<RwLock<HashMap<String, ScheduledState>>>,
}

impl InMemorySchedulerHandle {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulerHandle for InMemorySchedulerHandle {
    #[instrument(skip(self, function))]
    async fn after(&self, delay: Duration, function: ScheduledFunction) -> Result<String, SchedulerError> {
        let id = Uuid::new_v4().to_string();
        self.states.write().insert(id.clone(), ScheduledState::Pending);

        let states = self.states.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut states = states.write();
                match states.get(&task_id) {
                    Some(ScheduledState::Canceled) | None => return,
                    _ => {
                        states.insert(task_id.clone(), ScheduledState::Executing);
                    }
                }
            }
            let outcome = function().await;
            let mut states = states.write();
            match outcome {
                Ok(()) => {
                    states.insert(task_id.clone(), ScheduledState::Completed);
                    debug!(scheduled_function_id = %task_id, "scheduled function completed");
                }
                Err(err) => {
                    states.insert(task_id.clone(), ScheduledState::Failed);
                    warn!(scheduled_function_id = %task_id, error = %err, "scheduled function failed");
                }
            }
        });

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, scheduled_function_id: &str) -> Result<(), SchedulerError> {
        let mut states = self.states.write();
        match states.get(scheduled_function_id) {
            None => Err(SchedulerError::UnknownScheduledFunction(scheduled_function_id.to_string())),
            Some(ScheduledState::Completed) | Some(ScheduledState::Failed) | Some(ScheduledState::Executing) => {
                // already fired or running: cancellation is idempotent, not an error.
                Ok(())
            }
            Some(ScheduledState::Canceled) => Ok(()),
            Some(ScheduledState::Pending) => {
                states.insert(scheduled_function_id.to_string(), ScheduledState::Canceled);
                Ok(())
            }
        }
    }

    async fn state(&self, scheduled_function_id: &str) -> Result<ScheduledState, SchedulerError> {
        self.states
            .read()
            .get(scheduled_function_id)
            .copied()
            .ok_or_else(|| SchedulerError::UnknownScheduledFunction(scheduled_function_id.to_string()))
    }
}
