//! `MigrationRecord`: exists iff a workflow instance was created by the
//! migration manager in fast-forward mode (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub from_workflow_id: Uuid,
    pub to_workflow_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(from_workflow_id: Uuid, to_workflow_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            from_workflow_id,
            to_workflow_id,
            created_at: now,
        }
    }
}
