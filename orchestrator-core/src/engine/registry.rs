//! `WorkflowRegistry`: maps `(workflowName, versionName)` to the
//! immutable [`WorkflowDefinition`] it identifies (SPEC_FULL.md §13),
//! mirroring `everruns-durable`'s `WorkflowRegistry` (type name ->
//! factory) but keyed on the composite version tuple and storing
//! definitions directly rather than factories.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::element::{WorkflowDefinition, WorkflowVersion};
use crate::error::OrchestratorError;

#[derive(Default)]
pub struct WorkflowRegistry {
    definitions: RwLock<HashMap<WorkflowVersion, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a built definition, overwriting any prior definition at
    /// the same `(name, version)`. Returns the `Arc` the registry now
    /// shares with every caller, the same value `get` will hand back.
    pub fn register(&self, definition: WorkflowDefinition) -> Arc<WorkflowDefinition> {
        let version = definition.version();
        let shared = Arc::new(definition);
        self.definitions.write().insert(version, shared.clone());
        shared
    }

    pub fn get(&self, version: &WorkflowVersion) -> Result<Arc<WorkflowDefinition>, OrchestratorError> {
        self.definitions
            .read()
            .get(version)
            .cloned()
            .ok_or_else(|| OrchestratorError::entity_not_found_named("workflowVersion", version.to_string()))
    }

    pub fn get_by_name(
        &self,
        workflow_name: &str,
        version_name: &str,
    ) -> Result<Arc<WorkflowDefinition>, OrchestratorError> {
        self.get(&WorkflowVersion::new(workflow_name, version_name))
    }

    /// All registered versions of `workflow_name`, most recently
    /// registered order is not guaranteed (a `HashMap` iteration).
    pub fn versions_for(&self, workflow_name: &str) -> Vec<WorkflowVersion> {
        self.definitions
            .read()
            .keys()
            .filter(|v| v.workflow_name == workflow_name)
            .cloned()
            .collect()
    }
}
