//! Shared policy-evaluation step (spec §4.3): run after every owned
//! child (work item or sub-workflow) transition to decide whether the
//! owning task should keep waiting, complete, or fail.

use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::element::{PolicyDecision, PolicyInput, PolicyTransition, WorkflowDefinition};
use crate::error::OrchestratorError;

use super::core::Engine;

impl Engine {
    /// Aggregates `(workflow_id, task_name, generation)`'s stats, invokes
    /// the task's [`crate::element::PolicyFn`] with the transition that
    /// just happened, and drives the task forward if the policy says so.
    /// A task already terminal this generation is left alone — a late
    /// child transition (e.g. a straggling cancellation) must not re-fire
    /// a task that already completed.
    pub(crate) async fn apply_task_policy(
        &self,
        ctx: &ExecutionContext,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task_name: &str,
        generation: u64,
        transition: PolicyTransition,
    ) -> Result<(), OrchestratorError> {
        let task = self.store.get_task(workflow_id, task_name).await?;
        if task.generation != generation || task.state.is_terminal() {
            return Ok(());
        }

        let stats = super::stats::aggregate(&*self.store, workflow_id, task_name, generation).await?;
        let workflow = self.store.get_workflow(workflow_id).await?;
        let mut task_path = workflow.realized_path.clone();
        task_path.push(workflow_id);

        let task_def = def.task(task_name)?;
        let input = PolicyInput {
            workflow_id,
            task_name: task_name.to_string(),
            task_path,
            generation,
            stats,
            transition,
        };
        let decision = (task_def.policy)(&input);

        match decision {
            PolicyDecision::Continue => Ok(()),
            PolicyDecision::Complete => self.complete_task(ctx, def, workflow_id, task_name).await,
            PolicyDecision::Fail => self.fail_task(ctx, def, workflow_id, task_name).await,
        }
    }
}
