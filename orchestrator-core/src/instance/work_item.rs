//! `WorkItemInstance`: the runtime row behind one claimable unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkItemState {
    Initialized,
    Started,
    Completed,
    Failed,
    Canceled,
}

impl WorkItemState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemState::Completed | WorkItemState::Failed | WorkItemState::Canceled
        )
    }
}

/// A human claim on a work item: who, and when they took it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemClaim {
    pub user_id: String,
    pub claimed_at: DateTime<Utc>,
}

/// Identifies the task instance (and generation) a work item belongs to.
/// Mirrors [`WorkflowParent`] but for the work-item/task relationship;
/// the `task_generation` pins a work item to a single activation of its
/// task, scoping it away from a later re-enablement (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemParent {
    pub workflow_id: Uuid,
    pub task_name: String,
    pub task_generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemInstance {
    pub id: Uuid,
    pub parent: WorkItemParent,
    /// Root-to-self path of workflow ids this work item's workflow sits
    /// under, used to answer `getRootWorkflowIdForWorkItem` without a
    /// join (spec §8, P6).
    pub path: Vec<Uuid>,
    pub state: WorkItemState,
    pub claim: Option<WorkItemClaim>,
    pub payload: Value,
    /// Free-form metadata a work-item action callback may attach when
    /// offering the item to specific users/groups; consumed by the
    /// authorization-scope library this crate does not implement (spec §1).
    pub offer: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItemInstance {
    pub fn new(parent: WorkItemParent, path: Vec<Uuid>, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            parent,
            path,
            state: WorkItemState::Initialized,
            claim: None,
            payload,
            offer: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn root_workflow_id(&self) -> Uuid {
        self.path.first().copied().unwrap_or(self.parent.workflow_id)
    }
}
