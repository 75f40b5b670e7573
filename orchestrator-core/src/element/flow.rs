//! Directed flows between conditions and tasks, and the `route` callback
//! used by `xor`/`or` splits to pick successors at firing time.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

/// The destination end of a [`Flow`]: conditions and tasks live in
/// separate namespaces within a workflow, but both are addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowTarget {
    Condition(String),
    Task(String),
}

impl FlowTarget {
    pub fn name(&self) -> &str {
        match self {
            FlowTarget::Condition(name) | FlowTarget::Task(name) => name,
        }
    }
}

/// One outgoing edge. `weight` is carried for hosts that want a
/// probabilistic or prioritized route function to consult it; the core
/// firing algorithm itself does not interpret it.
#[derive(Debug, Clone)]
pub struct Flow {
    pub to: FlowTarget,
    pub weight: Option<u32>,
}

impl Flow {
    pub fn new(to: FlowTarget) -> Self {
        Self { to, weight: None }
    }

    pub fn with_weight(to: FlowTarget, weight: u32) -> Self {
        Self {
            to,
            weight: Some(weight),
        }
    }
}

/// Input handed to a `route` callback when a task with `xor`/`or` split
/// completes and must choose which outgoing flows receive a token.
#[derive(Debug, Clone)]
pub struct RouteInput<'a> {
    pub workflow_id: Uuid,
    pub task_name: &'a str,
    pub generation: u64,
    pub payload: &'a Value,
    /// The names of all outgoing successors (conditions), in declaration
    /// order, that `route` may choose among.
    pub candidates: &'a [String],
}

/// `xor` routers return exactly one name from `candidates`; `or` routers
/// return one or more. The firing algorithm validates arity against the
/// task's declared `split_type` rather than trusting the callback.
pub type RouteFn = Arc<dyn Fn(RouteInput<'_>) -> Vec<String> + Send + Sync>;
