//! `AuditContext`: the persisted trace position a later mutation on the
//! same workflow resumes from (spec §3, §4.11).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditContext {
    pub workflow_id: Uuid,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub depth: u32,
    /// Human-readable breadcrumb (e.g. `root/taskName/subworkflow`) used
    /// for log correlation; not interpreted by the bridge itself.
    pub path: String,
}

impl AuditContext {
    pub fn root(workflow_id: Uuid, trace_id: impl Into<String>) -> Self {
        Self {
            workflow_id,
            trace_id: trace_id.into(),
            parent_span_id: None,
            depth: 0,
            path: String::new(),
        }
    }

    pub fn child(&self, workflow_id: Uuid, parent_span_id: impl Into<String>, segment: &str) -> Self {
        Self {
            workflow_id,
            trace_id: self.trace_id.clone(),
            parent_span_id: Some(parent_span_id.into()),
            depth: self.depth + 1,
            path: if self.path.is_empty() {
                segment.to_string()
            } else {
                format!("{}/{}", self.path, segment)
            },
        }
    }
}
