//! Pure marking and enablement/firing primitives (spec §4.2).
//!
//! Kept free of any store/context dependency so the firing algorithm is
//! unit-testable as ordinary data transformations over a `HashMap`, the
//! same way `everruns-durable`'s `workflow::action` module reduces a
//! `WorkflowAction` list without touching the store. The engine layer
//! (`crate::engine`) is what turns a [`Marking`] diff into persisted
//! `ConditionInstance` patches.

use std::collections::HashMap;

use crate::element::{FlowTarget, JoinType, SplitType, WorkflowDefinition};

/// An in-memory view of every condition's token count for one workflow
/// instance. The engine loads this from [`crate::instance::ConditionInstance`]
/// rows, mutates a copy, and persists the diff.
#[derive(Debug, Clone, Default)]
pub struct Marking(HashMap<String, u32>);

impl Marking {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn from_tokens(tokens: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self(tokens.into_iter().collect())
    }

    pub fn get(&self, condition: &str) -> u32 {
        self.0.get(condition).copied().unwrap_or(0)
    }

    pub fn is_marked(&self, condition: &str) -> bool {
        self.get(condition) > 0
    }

    pub fn set(&mut self, condition: &str, value: u32) {
        self.0.insert(condition.to_string(), value);
    }

    pub fn add(&mut self, condition: &str, delta: i64) {
        let current = self.get(condition) as i64;
        let next = (current + delta).max(0) as u32;
        self.set(condition, next);
    }

    pub fn deposit(&mut self, condition: &str) {
        self.add(condition, 1);
    }

    pub fn consume(&mut self, condition: &str) {
        self.add(condition, -1);
    }

    pub fn clear(&mut self, condition: &str) {
        self.set(condition, 0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn marked_conditions(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

/// Whether a task's join condition is satisfied given a marking, and (for
/// `and`/`xor`) which incoming conditions to consume tokens from.
#[derive(Debug, Clone)]
pub struct JoinEvaluation {
    pub enabled: bool,
    /// Incoming conditions whose tokens the firing sequence should
    /// consume once the task actually fires. For `and`, every incoming
    /// condition; for `xor`, exactly one (the first marked one found);
    /// for `or`, every *currently marked* incoming condition (spec §8,
    /// boundary behaviors).
    pub consumes: Vec<String>,
}

/// Evaluate `and`/`xor` joins directly from the marking. `or` joins are
/// NOT handled here — they require the E2WFOJNet reachability analysis in
/// [`crate::orjoin`], since enablement depends on more than the current
/// marking alone.
pub fn evaluate_direct_join(
    def: &WorkflowDefinition,
    task_name: &str,
    join_type: JoinType,
    marking: &Marking,
) -> JoinEvaluation {
    let incoming = def.task_incoming(task_name);
    match join_type {
        JoinType::And => {
            let enabled = !incoming.is_empty() && incoming.iter().all(|c| marking.is_marked(c));
            JoinEvaluation {
                enabled,
                consumes: if enabled {
                    incoming.into_iter().map(String::from).collect()
                } else {
                    Vec::new()
                },
            }
        }
        JoinType::Xor => {
            let marked = incoming.iter().find(|c| marking.is_marked(c));
            match marked {
                Some(c) => JoinEvaluation {
                    enabled: true,
                    consumes: vec![c.to_string()],
                },
                None => JoinEvaluation {
                    enabled: false,
                    consumes: Vec::new(),
                },
            }
        }
        JoinType::Or => {
            // Caller must use `crate::orjoin::evaluate_or_join` instead.
            JoinEvaluation {
                enabled: false,
                consumes: Vec::new(),
            }
        }
    }
}

/// For an `or` join once it is known to be enabled (by the E2WFOJNet
/// analysis), consume every currently-marked incoming condition.
pub fn or_join_consumes(def: &WorkflowDefinition, task_name: &str, marking: &Marking) -> Vec<String> {
    def.task_incoming(task_name)
        .into_iter()
        .filter(|c| marking.is_marked(c))
        .map(String::from)
        .collect()
}

/// Result of evaluating a task's split on completion: which conditions
/// receive a token.
#[derive(Debug, Clone)]
pub struct SplitEvaluation {
    pub deposits: Vec<String>,
}

/// Evaluate a task's split given the successors chosen by its `route`
/// callback (for `xor`/`or`) or ignored (for `and`, which always deposits
/// on every outgoing condition successor).
pub fn evaluate_split(
    def: &WorkflowDefinition,
    task_name: &str,
    split_type: SplitType,
    routed: &[String],
) -> SplitEvaluation {
    match split_type {
        SplitType::And => SplitEvaluation {
            deposits: task_condition_successors(def, task_name),
        },
        SplitType::Xor => SplitEvaluation {
            deposits: routed.first().cloned().into_iter().collect(),
        },
        SplitType::Or => SplitEvaluation {
            deposits: routed.to_vec(),
        },
    }
}

/// Outgoing flow targets of `task_name`, restricted to condition names
/// (the only thing a task's split legally deposits into).
pub fn task_condition_successors(def: &WorkflowDefinition, task_name: &str) -> Vec<String> {
    def.tasks
        .get(task_name)
        .map(|t| {
            t.outgoing
                .iter()
                .filter_map(|f| match &f.to {
                    FlowTarget::Condition(c) => Some(c.clone()),
                    FlowTarget::Task(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
