//! `TaskInstance`: a transition's runtime state, scoped by generation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Disabled,
    Enabled,
    Started,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

/// A transition's runtime row.
///
/// `generation` increments every time the task re-enables after
/// completing, so that work items and sub-workflows spawned under an
/// earlier activation never get confused with the current one (spec §3,
/// `TaskInstance.generation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub workflow_id: Uuid,
    pub name: String,
    pub generation: u64,
    pub state: TaskState,
    /// For `xor`/`or` splits, the successors actually chosen by the route
    /// callback at firing time; empty until the task completes.
    pub realized_path: Vec<String>,
    /// The composite task that owns this task, if this task instance
    /// belongs to a sub-workflow.
    pub parent: Option<Uuid>,
}

impl TaskInstance {
    pub fn new(workflow_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            workflow_id,
            name: name.into(),
            generation: 0,
            state: TaskState::Disabled,
            realized_path: Vec::new(),
            parent: None,
        }
    }
}
