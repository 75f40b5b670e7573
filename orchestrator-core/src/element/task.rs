//! `TaskDefinition`: a transition in the net, in one of four shapes
//! (atomic / dummy / composite / dynamic composite), plus its lifecycle
//! callbacks and policy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::CallbackContext;
use crate::element::definition::WorkflowDefinition;
use crate::element::flow::{Flow, RouteFn};
use crate::element::policy::{AuthPolicyFn, PolicyFn};
use crate::element::workitem::WorkItemDefinition;
use crate::error::OrchestratorError;

/// A lifecycle or action callback. Owns its captured environment, exactly
/// like `everruns-durable`'s `WorkflowFactory` closures — source
/// represents these as closures, and this engine keeps them as closures
/// too rather than attempting to serialize them (spec §9: "do not attempt
/// to serialize closures").
pub type TaskCallback =
    Arc<dyn Fn(CallbackContext) -> BoxFuture<'static, Result<(), OrchestratorError>> + Send + Sync>;

/// How a task decides how many incoming edges must be marked before it
/// enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    And,
    Or,
    Xor,
}

/// How a task decides how many outgoing edges receive a token when it
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitType {
    #[default]
    And,
    Or,
    Xor,
}

/// Validates (and may reject) a payload before a callback runs. `Never`
/// means the action is payloadless: any non-null payload is rejected.
#[derive(Clone)]
pub enum PayloadSchema {
    Never,
    Any,
    Validated(Arc<dyn Fn(&Value) -> Result<(), OrchestratorError> + Send + Sync>),
}

impl fmt::Debug for PayloadSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSchema::Never => write!(f, "PayloadSchema::Never"),
            PayloadSchema::Any => write!(f, "PayloadSchema::Any"),
            PayloadSchema::Validated(_) => write!(f, "PayloadSchema::Validated(..)"),
        }
    }
}

impl PayloadSchema {
    pub fn validate(&self, payload: &Value) -> Result<(), OrchestratorError> {
        match self {
            PayloadSchema::Never => {
                if matches!(payload, Value::Null) {
                    Ok(())
                } else {
                    Err(OrchestratorError::ConstraintViolation(
                        "action does not accept a payload".into(),
                    ))
                }
            }
            PayloadSchema::Any => Ok(()),
            PayloadSchema::Validated(f) => f(payload),
        }
    }
}

/// A typed action attached to a task/work-item/workflow instantiation
/// point: payload schema, authorization policy, and the callback that
/// actually runs once both pass.
#[derive(Clone)]
pub struct ActionDefinition {
    pub payload_schema: PayloadSchema,
    pub auth_policy: AuthPolicyFn,
    pub callback: Option<TaskCallback>,
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("payload_schema", &self.payload_schema)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl ActionDefinition {
    pub fn new(payload_schema: PayloadSchema) -> Self {
        Self {
            payload_schema,
            auth_policy: crate::element::policy::allow_all(),
            callback: None,
        }
    }

    pub fn with_auth_policy(mut self, policy: AuthPolicyFn) -> Self {
        self.auth_policy = policy;
        self
    }

    pub fn with_callback(mut self, callback: TaskCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl Default for ActionDefinition {
    fn default() -> Self {
        Self::new(PayloadSchema::Any)
    }
}

/// Lifecycle activity callbacks shared by every task kind. Missing
/// callbacks default to no-op (spec §4.1: "`withActivities(activities)`
/// ... Missing callbacks default to no-op").
#[derive(Clone, Default)]
pub struct Activities {
    pub on_enabled: Option<TaskCallback>,
    pub on_started: Option<TaskCallback>,
    pub on_completed: Option<TaskCallback>,
    pub on_failed: Option<TaskCallback>,
    pub on_canceled: Option<TaskCallback>,
    pub on_disabled: Option<TaskCallback>,
    /// For atomic tasks: fired after each owned work item changes state.
    pub on_work_item_state_changed: Option<TaskCallback>,
    /// For composite/dynamic-composite tasks: fired after each owned
    /// sub-workflow changes state.
    pub on_workflow_state_changed: Option<TaskCallback>,
}

impl fmt::Debug for Activities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activities")
            .field("on_enabled", &self.on_enabled.is_some())
            .field("on_started", &self.on_started.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_canceled", &self.on_canceled.is_some())
            .field("on_disabled", &self.on_disabled.is_some())
            .field(
                "on_work_item_state_changed",
                &self.on_work_item_state_changed.is_some(),
            )
            .field(
                "on_workflow_state_changed",
                &self.on_workflow_state_changed.is_some(),
            )
            .finish()
    }
}

/// The four task shapes named in spec §3. A composite task owns exactly
/// one child workflow definition; a dynamic composite task owns a named
/// map of them, selected per-instance by the `onEnabled` callback.
pub enum TaskKind {
    Atomic(WorkItemDefinition),
    Dummy,
    Composite(Box<WorkflowDefinition>),
    DynamicComposite(HashMap<String, WorkflowDefinition>),
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Atomic(_) => write!(f, "TaskKind::Atomic"),
            TaskKind::Dummy => write!(f, "TaskKind::Dummy"),
            TaskKind::Composite(def) => write!(f, "TaskKind::Composite({})", def.name),
            TaskKind::DynamicComposite(map) => {
                write!(f, "TaskKind::DynamicComposite({:?})", map.keys())
            }
        }
    }
}

pub struct TaskDefinition {
    pub name: String,
    pub kind: TaskKind,
    pub split_type: SplitType,
    pub join_type: JoinType,
    pub stats_shard_count: u32,
    pub activities: Activities,
    pub policy: PolicyFn,
    /// Action definition governing composite/dynamic-composite child
    /// instantiation payloads; `None` for atomic/dummy tasks (work-item
    /// actions live on [`WorkItemDefinition`] instead).
    pub instantiation_action: Option<ActionDefinition>,
    pub outgoing: Vec<Flow>,
    /// Selects successors for `xor`/`or` splits at firing time. Required
    /// (and validated by the builder) whenever `split_type != And`.
    pub route: Option<RouteFn>,
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("split_type", &self.split_type)
            .field("join_type", &self.join_type)
            .field("stats_shard_count", &self.stats_shard_count)
            .field("activities", &self.activities)
            .field("outgoing", &self.outgoing)
            .field("has_route", &self.route.is_some())
            .finish()
    }
}

impl TaskDefinition {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, TaskKind::Atomic(_))
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.kind, TaskKind::Dummy)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, TaskKind::Composite(_) | TaskKind::DynamicComposite(_))
    }

    pub fn work_item_definition(&self) -> Option<&WorkItemDefinition> {
        match &self.kind {
            TaskKind::Atomic(def) => Some(def),
            _ => None,
        }
    }

    pub fn child_definition(&self, variant: Option<&str>) -> Option<&WorkflowDefinition> {
        match &self.kind {
            TaskKind::Composite(def) => Some(def),
            TaskKind::DynamicComposite(map) => variant.and_then(|v| map.get(v)),
            _ => None,
        }
    }
}
