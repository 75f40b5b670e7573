//! Task policies (spec §4.3) and the authorization-policy seam (spec §6)
//! consumed by work-item and sub-workflow actions.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::instance::TaskStats;

/// `(prevState, nextState)` of the child transition that triggered a
/// policy evaluation, rendered as strings since the child may be a
/// work-item state or a sub-workflow state.
#[derive(Debug, Clone)]
pub struct PolicyTransition {
    pub prev_state: String,
    pub next_state: String,
}

/// Everything a task policy is allowed to see: aggregated stats for the
/// current generation, the transition that just happened, and enough
/// addressing context to log or branch on.
#[derive(Debug, Clone)]
pub struct PolicyInput {
    pub workflow_id: Uuid,
    pub task_name: String,
    pub task_path: Vec<Uuid>,
    pub generation: u64,
    pub stats: TaskStats,
    pub transition: PolicyTransition,
}

/// What a policy decides a task should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Continue,
    Complete,
    Fail,
}

/// Policies are synchronous and pure over the stats already aggregated
/// by the engine (spec §4.3: "pure with respect to the database aside
/// from reads it performs" — those reads are the stats aggregation the
/// engine does before calling the policy, not a capability the policy
/// itself is handed).
pub type PolicyFn = Arc<dyn Fn(&PolicyInput) -> PolicyDecision + Send + Sync>;

/// The default policy described in spec §4.3 and resolved as an open
/// question in §9: complete once every initialized child of the current
/// generation has reached a terminal state and at least one completed;
/// fail if any child failed and none completed (no compensation path is
/// modeled by this engine).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl DefaultPolicy {
    pub fn evaluate(input: &PolicyInput) -> PolicyDecision {
        let stats = &input.stats;
        let outstanding = stats.initialized + stats.started;
        if outstanding > 0 {
            return PolicyDecision::Continue;
        }
        if stats.completed > 0 {
            PolicyDecision::Complete
        } else if stats.failed > 0 {
            PolicyDecision::Fail
        } else {
            // Every child canceled and none completed: the default policy
            // treats this as completion of an empty/void task rather than
            // stalling it forever.
            PolicyDecision::Complete
        }
    }

    pub fn as_fn() -> PolicyFn {
        Arc::new(|input: &PolicyInput| Self::evaluate(input))
    }
}

/// Outcome of an authorization check (spec §6: `policy(ctx) -> {allowed,
/// reason}`).
#[derive(Debug, Clone)]
pub struct AuthDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AuthDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Context handed to an authorization policy: enough to check scopes
/// against the action being attempted without the policy needing engine
/// internals.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub workflow_id: Uuid,
    pub task_name: String,
    pub work_item_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub payload: Value,
    pub is_internal_mutation: bool,
}

pub type AuthPolicyFn = Arc<dyn Fn(&AuthContext) -> AuthDecision + Send + Sync>;

/// An authorization policy that allows every caller; the default for
/// actions that declare no policy.
pub fn allow_all() -> AuthPolicyFn {
    Arc::new(|_ctx: &AuthContext| AuthDecision::allow())
}
