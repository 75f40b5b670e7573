//! `SubWorkflowInstance`: a running child workflow owned by a composite
//! or dynamic-composite task. The actual workflow state lives in the
//! corresponding [`crate::instance::WorkflowInstance`] row; this is the
//! join record the parent task's policy reads to track it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instance::workflow::WorkflowParent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubWorkflowState {
    Initialized,
    Started,
    Completed,
    Failed,
    Canceled,
}

impl SubWorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubWorkflowState::Completed | SubWorkflowState::Failed | SubWorkflowState::Canceled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubWorkflowInstance {
    /// Equal to the child [`crate::instance::WorkflowInstance::id`]; this
    /// row and the child workflow row are created together.
    pub workflow_id: Uuid,
    pub parent: WorkflowParent,
    /// Name of the child workflow definition this instance realizes; for
    /// a dynamic composite task, the key into its child-definition map.
    pub name: String,
    pub version_name: String,
    pub state: SubWorkflowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubWorkflowInstance {
    pub fn new(workflow_id: Uuid, parent: WorkflowParent, name: impl Into<String>, version_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            parent,
            name: name.into(),
            version_name: version_name.into(),
            state: SubWorkflowState::Initialized,
            created_at: now,
            updated_at: now,
        }
    }
}
