//! `WorkItemDefinition`: the typed actions and activities owned by an
//! atomic task.

use std::fmt;

use crate::element::task::{ActionDefinition, TaskCallback};

/// The six typed actions a work item supports (spec §3). Each is an
/// [`ActionDefinition`]; a `None` payload schema override falls back to
/// accepting any payload.
#[derive(Default)]
pub struct WorkItemActions {
    pub initialize: Option<ActionDefinition>,
    pub start: Option<ActionDefinition>,
    pub complete: Option<ActionDefinition>,
    pub fail: Option<ActionDefinition>,
    pub cancel: Option<ActionDefinition>,
    pub reset: Option<ActionDefinition>,
}

impl fmt::Debug for WorkItemActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemActions")
            .field("initialize", &self.initialize.is_some())
            .field("start", &self.start.is_some())
            .field("complete", &self.complete.is_some())
            .field("fail", &self.fail.is_some())
            .field("cancel", &self.cancel.is_some())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct WorkItemDefinition {
    pub actions: WorkItemActions,
    pub on_canceled: Option<TaskCallback>,
    pub on_failed: Option<TaskCallback>,
}

impl fmt::Debug for WorkItemDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItemDefinition")
            .field("actions", &self.actions)
            .field("on_canceled", &self.on_canceled.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .finish()
    }
}

impl WorkItemDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `reset` (`started -> initialized`) is permitted: spec
    /// §4.4 gates `reset` on the action being defined at all.
    pub fn allows_reset(&self) -> bool {
        self.actions.reset.is_some()
    }
}
