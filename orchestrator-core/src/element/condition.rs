//! `ConditionDefinition`: a place in the static Petri net.

use crate::element::flow::Flow;

/// A place in the net. Holds its own outgoing flows, mirroring how the
/// builder's `connectCondition(name, to)` attaches successors directly to
/// the condition that owns them.
#[derive(Debug, Clone)]
pub struct ConditionDefinition {
    pub name: String,
    pub outgoing: Vec<Flow>,
}

impl ConditionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outgoing: Vec::new(),
        }
    }
}
