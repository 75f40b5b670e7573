//! E2WFOJNet: the OR-join reachability analysis (spec §4.8).
//!
//! An OR-join task `T` enables when, given the current marking, no future
//! firing sequence can deliver a token to any of `T`'s still-unmarked
//! incoming conditions. This module restricts the net to the elements
//! that can reach `T`, then grows a conservative "could still become
//! marked" set by fixpoint iteration until it stops changing; if none of
//! `T`'s unmarked incoming conditions end up in that set, the OR-join is
//! satisfied.
//!
//! The "could still become marked" set only ever grows (bounded by the
//! restricted net's node count), so the fixpoint always terminates —
//! this is the finite state space spec §4.8 refers to.

use std::collections::HashSet;

use crate::element::{FlowTarget, JoinType, WorkflowDefinition};
use crate::marking::Marking;

/// Nodes in the net, used internally by the restriction/fixpoint passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Condition(String),
    Task(String),
}

/// Backward BFS from `T` over reversed edges: every condition/task that
/// has some directed path to `T` (step 1 of the algorithm: "restrict the
/// net to T").
fn nodes_reaching(def: &WorkflowDefinition, target_task: &str) -> HashSet<Node> {
    let mut reaching = HashSet::new();
    let mut stack = vec![Node::Task(target_task.to_string())];
    reaching.insert(Node::Task(target_task.to_string()));

    while let Some(node) = stack.pop() {
        match &node {
            Node::Task(name) => {
                for predecessor in def.task_incoming(name) {
                    let pred = Node::Condition(predecessor.to_string());
                    if reaching.insert(pred.clone()) {
                        stack.push(pred);
                    }
                }
            }
            Node::Condition(name) => {
                for predecessor in def.condition_incoming(name) {
                    let pred = Node::Task(predecessor.to_string());
                    if reaching.insert(pred.clone()) {
                        stack.push(pred);
                    }
                }
            }
        }
    }

    reaching
}

/// Whether, given the set of conditions already known to be "could still
/// become marked" (or currently marked), `task` could fire — judged
/// optimistically by its own join type so the analysis never under-counts
/// a path that might still deliver a token.
fn task_activable(
    def: &WorkflowDefinition,
    task_name: &str,
    active: &HashSet<Node>,
    dead_tasks: &HashSet<String>,
) -> bool {
    if dead_tasks.contains(task_name) {
        return false;
    }
    let Ok(task) = def.task(task_name) else {
        return false;
    };
    let incoming = def.task_incoming(task_name);
    if incoming.is_empty() {
        return false;
    }
    match task.join_type {
        JoinType::And => incoming
            .iter()
            .all(|c| active.contains(&Node::Condition(c.to_string()))),
        JoinType::Xor | JoinType::Or => incoming
            .iter()
            .any(|c| active.contains(&Node::Condition(c.to_string()))),
    }
}

/// Computes the restricted net's reachable-from-current-marking set and
/// returns it. This is steps 2-3 of the algorithm.
fn reachable_active_set(
    def: &WorkflowDefinition,
    restricted: &HashSet<Node>,
    marking: &Marking,
    dead_tasks: &HashSet<String>,
) -> HashSet<Node> {
    let mut active: HashSet<Node> = restricted
        .iter()
        .filter(|n| matches!(n, Node::Condition(c) if marking.is_marked(c)))
        .cloned()
        .collect();

    loop {
        let mut changed = false;

        let tasks_in_scope: Vec<&str> = restricted
            .iter()
            .filter_map(|n| match n {
                Node::Task(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        for task_name in tasks_in_scope {
            let task_node = Node::Task(task_name.to_string());
            if active.contains(&task_node) {
                continue;
            }
            if task_activable(def, task_name, &active, dead_tasks) {
                active.insert(task_node);
                changed = true;
                for successor in def.task_successors(task_name) {
                    let successor_node = Node::Condition(successor.to_string());
                    if restricted.contains(&successor_node) && active.insert(successor_node) {
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    active
}

/// Evaluate whether `task_name`'s OR-join is satisfied under `marking`.
///
/// `dead_tasks` names tasks whose current generation has already reached
/// `canceled`/`failed` and therefore can never again deposit a token in
/// this marking's lifetime (spec §8, "completion can kill a path that was
/// expected to contribute"); the engine computes this set from persisted
/// `TaskInstance` rows before calling in.
///
/// Per spec §8: a task whose incoming conditions are all unmarked is
/// never OR-join-enabled, regardless of what the reachability analysis
/// would otherwise conclude.
pub fn evaluate_or_join(
    def: &WorkflowDefinition,
    task_name: &str,
    marking: &Marking,
    dead_tasks: &HashSet<String>,
) -> bool {
    let incoming = def.task_incoming(task_name);
    if incoming.is_empty() || incoming.iter().all(|c| !marking.is_marked(c)) {
        return false;
    }

    let unmarked: Vec<&str> = incoming.into_iter().filter(|c| !marking.is_marked(c)).collect();
    if unmarked.is_empty() {
        // every incoming condition already marked: equivalent to an and-join
        // that happens to be satisfied.
        return true;
    }

    let restricted = nodes_reaching(def, task_name);
    let active = reachable_active_set(def, &restricted, marking, dead_tasks);

    unmarked
        .iter()
        .all(|c| !active.contains(&Node::Condition(c.to_string())))
}
