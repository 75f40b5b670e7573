//! `ScheduledEntry`: the reverse index the scheduler bridge uses to
//! cancel pending delayed functions (spec §3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three shapes a scheduled-function key can take, matching the
/// `workflow/{id}`, `task/{taskId}/{generation}`, `workItem/{id}` forms
/// named in spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ScheduledKey {
    Workflow(Uuid),
    Task { workflow_id: Uuid, task_name: String, generation: u64 },
    WorkItem(Uuid),
}

impl ScheduledKey {
    /// Render as the `kind/value` string the spec's prose uses, and what
    /// a prefix-scan cancellation (spec §4.10) filters by.
    pub fn as_string(&self) -> String {
        match self {
            ScheduledKey::Workflow(id) => format!("workflow/{id}"),
            ScheduledKey::Task { workflow_id, task_name, generation } => {
                format!("task/{workflow_id}/{task_name}/{generation}")
            }
            ScheduledKey::WorkItem(id) => format!("workItem/{id}"),
        }
    }

    /// Whether `self` falls under the task-cancellation prefix for
    /// `workflow_id`/`task_name` at any generation, used when the
    /// cancellation-region pass cancels everything scheduled for a task
    /// regardless of which generation registered it.
    pub fn matches_task_prefix(&self, workflow_id: Uuid, task_name: &str) -> bool {
        matches!(self, ScheduledKey::Task { workflow_id: w, task_name: t, .. } if *w == workflow_id && t == task_name)
    }

    pub fn matches_workflow(&self, workflow_id: Uuid) -> bool {
        match self {
            ScheduledKey::Workflow(id) => *id == workflow_id,
            ScheduledKey::Task { workflow_id: w, .. } => *w == workflow_id,
            ScheduledKey::WorkItem(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEntry {
    /// The id returned by `scheduler.after`, opaque to this engine.
    pub scheduled_function_id: String,
    pub key: ScheduledKey,
    pub created_at: DateTime<Utc>,
}

impl ScheduledEntry {
    pub fn new(scheduled_function_id: impl Into<String>, key: ScheduledKey, now: DateTime<Utc>) -> Self {
        Self {
            scheduled_function_id: scheduled_function_id.into(),
            key,
            created_at: now,
        }
    }
}
