//! `getWorkflowStructure` static introspection (spec §6, detailed in
//! `SPEC_FULL.md` §13): a serializable description of the element graph
//! for a host UI layer to render without re-deriving it from the
//! builder.

use serde::{Deserialize, Serialize};

use crate::element::cancellation::CancellationRegion;
use crate::element::flow::FlowTarget;
use crate::element::task::{JoinType, SplitType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKindTag {
    Atomic,
    Dummy,
    Composite,
    DynamicComposite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskKindSummary {
    pub name: String,
    pub kind: TaskKindTag,
    pub split_type: SplitTypeTag,
    pub join_type: JoinTypeTag,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SplitTypeTag {
    And,
    Or,
    Xor,
}

impl From<SplitType> for SplitTypeTag {
    fn from(value: SplitType) -> Self {
        match value {
            SplitType::And => SplitTypeTag::And,
            SplitType::Or => SplitTypeTag::Or,
            SplitType::Xor => SplitTypeTag::Xor,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinTypeTag {
    And,
    Or,
    Xor,
}

impl From<JoinType> for JoinTypeTag {
    fn from(value: JoinType) -> Self {
        match value {
            JoinType::And => JoinTypeTag::And,
            JoinType::Or => JoinTypeTag::Or,
            JoinType::Xor => JoinTypeTag::Xor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub from: String,
    pub to: String,
}

impl FlowEdge {
    pub fn new(from: impl Into<String>, to: &FlowTarget) -> Self {
        Self {
            from: from.into(),
            to: to.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStructure {
    pub workflow_name: String,
    pub version_name: String,
    pub start_condition: String,
    pub end_condition: String,
    pub conditions: Vec<String>,
    pub tasks: Vec<TaskKindSummary>,
    pub flows: Vec<FlowEdge>,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty", default)]
    pub cancellation_regions: std::collections::HashMap<String, CancellationRegionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRegionSummary {
    pub tasks: Vec<String>,
    pub conditions: Vec<String>,
}

impl From<&CancellationRegion> for CancellationRegionSummary {
    fn from(region: &CancellationRegion) -> Self {
        let mut tasks: Vec<String> = region.tasks.iter().cloned().collect();
        let mut conditions: Vec<String> = region.conditions.iter().cloned().collect();
        tasks.sort();
        conditions.sort();
        Self { tasks, conditions }
    }
}
