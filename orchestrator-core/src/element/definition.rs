//! `WorkflowDefinition`: the immutable, per-version element graph.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::WorkflowCallbackContext;
use crate::element::condition::ConditionDefinition;
use crate::element::flow::FlowTarget;
use crate::element::cancellation::CancellationRegion;
use crate::element::structure::{
    CancellationRegionSummary, FlowEdge, TaskKindSummary, TaskKindTag, WorkflowStructure,
};
use crate::element::task::ActionDefinition;
use crate::element::task::TaskDefinition;
use crate::element::task::TaskKind;
use crate::error::OrchestratorError;

/// A workflow-level lifecycle callback, the analogue of [`super::task::TaskCallback`]
/// for the workflow itself rather than one of its tasks (spec §4.7).
pub type WorkflowCallback = Arc<
    dyn Fn(WorkflowCallbackContext) -> BoxFuture<'static, Result<(), OrchestratorError>>
        + Send
        + Sync,
>;

/// Lifecycle callbacks attached to the workflow as a whole. Missing
/// callbacks default to no-op, same as [`super::task::Activities`].
#[derive(Clone, Default)]
pub struct WorkflowActivities {
    pub on_initialized: Option<WorkflowCallback>,
    pub on_started: Option<WorkflowCallback>,
    pub on_completed: Option<WorkflowCallback>,
    pub on_canceled: Option<WorkflowCallback>,
    pub on_failed: Option<WorkflowCallback>,
}

impl fmt::Debug for WorkflowActivities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowActivities")
            .field("on_initialized", &self.on_initialized.is_some())
            .field("on_started", &self.on_started.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .field("on_canceled", &self.on_canceled.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .finish()
    }
}

/// `(workflowName, versionName)`, the key a workflow version is
/// identified by (spec §2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub workflow_name: String,
    pub version_name: String,
}

impl WorkflowVersion {
    pub fn new(workflow_name: impl Into<String>, version_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            version_name: version_name.into(),
        }
    }
}

impl fmt::Display for WorkflowVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.workflow_name, self.version_name)
    }
}

/// What a task migrator decided for the task it bridges (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Place the task in a terminal state consistent with the source
    /// instance; no further callbacks fire for it.
    FastForward,
    /// The task runs normally, as if freshly enabled, from here on.
    Continue,
}

/// Context handed to a migration initializer, finalizer, or per-task
/// migrator: the source and target workflow ids plus the usual execution
/// context fields, supplied by the migration manager.
#[derive(Clone)]
pub struct MigrationCallbackContext {
    pub exec: crate::context::ExecutionContext,
    pub from_workflow_id: Uuid,
    pub to_workflow_id: Uuid,
    pub task_name: Option<String>,
    pub payload: serde_json::Value,
}

pub type MigrationInitializerFn = Arc<
    dyn Fn(MigrationCallbackContext) -> BoxFuture<'static, Result<(), OrchestratorError>>
        + Send
        + Sync,
>;

pub type TaskMigratorFn = Arc<
    dyn Fn(MigrationCallbackContext) -> BoxFuture<'static, Result<MigrationOutcome, OrchestratorError>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct MigrationDefinition {
    pub initializer: Option<MigrationInitializerFn>,
    pub finalizer: Option<MigrationInitializerFn>,
    pub task_migrators: HashMap<String, TaskMigratorFn>,
}

impl fmt::Debug for MigrationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationDefinition")
            .field("has_initializer", &self.initializer.is_some())
            .field("has_finalizer", &self.finalizer.is_some())
            .field("task_migrators", &self.task_migrators.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The immutable per-version workflow graph (spec §3).
#[derive(Debug)]
pub struct WorkflowDefinition {
    pub name: String,
    pub version_name: String,
    pub is_deprecated: bool,
    pub start_condition_name: String,
    pub end_condition_name: String,
    pub tasks: HashMap<String, TaskDefinition>,
    pub conditions: HashMap<String, ConditionDefinition>,
    pub cancellation_regions: HashMap<String, CancellationRegion>,
    pub migration: Option<MigrationDefinition>,
    pub activities: WorkflowActivities,
    /// The explicit-cancel action named in spec §4.7: run only when
    /// `cancel(reason = explicit)` is invoked, never for migration/teardown
    /// cancellation cascades.
    pub cancel_action: Option<ActionDefinition>,
}

impl WorkflowDefinition {
    pub fn version(&self) -> WorkflowVersion {
        WorkflowVersion::new(self.name.clone(), self.version_name.clone())
    }

    pub fn task(&self, name: &str) -> Result<&TaskDefinition, OrchestratorError> {
        self.tasks
            .get(name)
            .ok_or_else(|| OrchestratorError::entity_not_found_named("task", name.to_string()))
    }

    pub fn condition(&self, name: &str) -> Result<&ConditionDefinition, OrchestratorError> {
        self.conditions
            .get(name)
            .ok_or_else(|| OrchestratorError::entity_not_found_named("condition", name.to_string()))
    }

    /// All conditions with at least one incoming flow from `task_name`,
    /// i.e. `task_name`'s outgoing successors restricted to conditions
    /// (tasks only ever flow into conditions in a well-formed net).
    pub fn task_successors(&self, task_name: &str) -> Vec<&str> {
        self.tasks
            .get(task_name)
            .map(|t| t.outgoing.iter().map(|f| f.to.name()).collect())
            .unwrap_or_default()
    }

    /// Tasks with an incoming flow from `condition_name`.
    pub fn condition_successors(&self, condition_name: &str) -> Vec<&str> {
        self.conditions
            .get(condition_name)
            .map(|c| c.outgoing.iter().map(|f| f.to.name()).collect())
            .unwrap_or_default()
    }

    /// Conditions that flow directly into `task_name` (its incoming set).
    pub fn task_incoming(&self, task_name: &str) -> Vec<&str> {
        self.conditions
            .values()
            .filter(|c| {
                c.outgoing
                    .iter()
                    .any(|f| matches!(&f.to, FlowTarget::Task(t) if t == task_name))
            })
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Tasks that flow directly into `condition_name` (its incoming set).
    pub fn condition_incoming(&self, condition_name: &str) -> Vec<&str> {
        self.tasks
            .values()
            .filter(|t| {
                t.outgoing
                    .iter()
                    .any(|f| matches!(&f.to, FlowTarget::Condition(c) if c == condition_name))
            })
            .map(|t| t.name.as_str())
            .collect()
    }

    pub fn structure(&self) -> WorkflowStructure {
        let mut conditions: Vec<String> = self.conditions.keys().cloned().collect();
        conditions.sort();

        let mut tasks: Vec<TaskKindSummary> = self
            .tasks
            .values()
            .map(|t| TaskKindSummary {
                name: t.name.clone(),
                kind: match &t.kind {
                    TaskKind::Atomic(_) => TaskKindTag::Atomic,
                    TaskKind::Dummy => TaskKindTag::Dummy,
                    TaskKind::Composite(_) => TaskKindTag::Composite,
                    TaskKind::DynamicComposite(_) => TaskKindTag::DynamicComposite,
                },
                split_type: t.split_type.into(),
                join_type: t.join_type.into(),
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));

        let mut flows = Vec::new();
        for condition in self.conditions.values() {
            for flow in &condition.outgoing {
                flows.push(FlowEdge::new(condition.name.clone(), &flow.to));
            }
        }
        for task in self.tasks.values() {
            for flow in &task.outgoing {
                flows.push(FlowEdge::new(task.name.clone(), &flow.to));
            }
        }
        flows.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));

        let cancellation_regions = self
            .cancellation_regions
            .iter()
            .map(|(k, v)| (k.clone(), CancellationRegionSummary::from(v)))
            .collect();

        WorkflowStructure {
            workflow_name: self.name.clone(),
            version_name: self.version_name.clone(),
            start_condition: self.start_condition_name.clone(),
            end_condition: self.end_condition_name.clone(),
            conditions,
            tasks,
            flows,
            cancellation_regions,
        }
    }
}
