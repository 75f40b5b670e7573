//! `ConditionInstance`: a place in the Petri net and its token count.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionInstance {
    pub workflow_id: Uuid,
    pub name: String,
    pub marking: u32,
}

impl ConditionInstance {
    pub fn new(workflow_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            workflow_id,
            name: name.into(),
            marking: 0,
        }
    }

    pub fn is_marked(&self) -> bool {
        self.marking > 0
    }
}
