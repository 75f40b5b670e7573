//! `WorkflowInstance`: a single running (or terminated) workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ExecutionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowState {
    Initialized,
    Started,
    Completed,
    Canceled,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Canceled | WorkflowState::Failed
        )
    }
}

/// Why a workflow is being canceled (spec §4.7): an `Explicit` cancel is
/// the one case that runs a workflow's declared `cancel_action`; a
/// `Teardown` cancel is one cascaded down from an owning task's
/// cancellation region or from its parent's own cancellation/failure, and
/// never re-invokes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Explicit,
    Teardown,
}

/// Identifies the composite/dynamic-composite task that owns a
/// sub-workflow instance, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowParent {
    pub workflow_id: Uuid,
    pub task_name: String,
    pub task_generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub workflow_name: String,
    pub version_name: String,
    pub parent: Option<WorkflowParent>,
    pub state: WorkflowState,
    /// Sequence of workflow ids from the root to this instance, inclusive
    /// of the root and exclusive of `self.id`. Empty for the root.
    pub realized_path: Vec<Uuid>,
    pub execution_mode: ExecutionMode,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn root_id(&self) -> Uuid {
        self.realized_path.first().copied().unwrap_or(self.id)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
