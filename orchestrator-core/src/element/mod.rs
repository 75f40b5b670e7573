//! The static element graph: conditions, tasks, flows, cancellation
//! regions — everything that is fixed at workflow-definition time.
//!
//! Mirrors the `Definition*`/`*Instance` split this engine's design
//! calls for: types in this module are immutable values shared across
//! every run of a workflow version, while [`crate::instance`] holds the
//! per-run rows. A `WorkflowDefinition` is built once, through
//! [`WorkflowDefinitionBuilder`], and then treated as read-only.

mod builder;
mod cancellation;
mod condition;
mod definition;
mod flow;
mod policy;
mod structure;
mod task;
mod workitem;

pub use builder::{BuilderError, ConnectTo, TaskOptions, WorkflowDefinitionBuilder};
pub use cancellation::CancellationRegion;
pub use condition::ConditionDefinition;
pub use definition::{
    MigrationCallbackContext, MigrationDefinition, MigrationInitializerFn, MigrationOutcome,
    TaskMigratorFn, WorkflowActivities, WorkflowCallback, WorkflowDefinition, WorkflowVersion,
};
pub use flow::{Flow, FlowTarget, RouteFn, RouteInput};
pub use policy::{
    allow_all, AuthContext, AuthDecision, AuthPolicyFn, DefaultPolicy, PolicyDecision, PolicyFn,
    PolicyInput, PolicyTransition,
};
pub use structure::{
    CancellationRegionSummary, FlowEdge, JoinTypeTag, SplitTypeTag, TaskKindSummary, TaskKindTag,
    WorkflowStructure,
};
pub use task::{
    ActionDefinition, Activities, JoinType, PayloadSchema, SplitType, TaskCallback, TaskDefinition,
    TaskKind,
};
pub use workitem::{WorkItemActions, WorkItemDefinition};
