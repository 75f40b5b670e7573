//! The builder that assembles a [`WorkflowDefinition`] (spec §4.1).
//!
//! Construction is infallible — every `with_*`/`task`/`connect_*` call
//! just records intent — and validation runs once, batched, at
//! [`WorkflowDefinitionBuilder::build`], following `everruns-durable`'s
//! preference for descriptive `thiserror` variants over first-failure
//! aborts (SPEC_FULL.md §13).

use std::collections::HashMap;

use crate::element::cancellation::CancellationRegion;
use crate::element::condition::ConditionDefinition;
use crate::element::definition::{MigrationDefinition, WorkflowActivities, WorkflowDefinition};
use crate::element::flow::{Flow, FlowTarget, RouteFn};
use crate::element::policy::PolicyFn;
use crate::element::task::{
    ActionDefinition, Activities, JoinType, SplitType, TaskDefinition, TaskKind,
};
use crate::element::workitem::WorkItemDefinition;

/// Every invariant violation the builder can detect, named per spec §7's
/// `StructuralIntegrity` kind.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("startCondition must be called exactly once (called {0} times)")]
    MissingOrDuplicateStartCondition(u32),

    #[error("endCondition must be called exactly once (called {0} times)")]
    MissingOrDuplicateEndCondition(u32),

    #[error("duplicate task name: {0}")]
    DuplicateTaskName(String),

    #[error("duplicate condition name: {0}")]
    DuplicateConditionName(String),

    #[error("flow from '{from}' targets undefined {kind} '{to}'")]
    DanglingFlow {
        from: String,
        to: String,
        kind: &'static str,
    },

    #[error("cancellation region on task '{task}' targets undefined {kind} '{target}'")]
    UnknownCancellationTarget {
        task: String,
        target: String,
        kind: &'static str,
    },

    #[error("task '{0}' has no incoming flow")]
    TaskMissingIncoming(String),

    #[error("task '{0}' has no outgoing flow")]
    TaskMissingOutgoing(String),

    #[error("task '{0}' has split_type xor/or but no route function was attached")]
    MissingRouteFunction(String),

    #[error("task '{0}' is not reachable from the start condition")]
    UnreachableTask(String),

    #[error("connect_condition/connect_task called on undefined element '{0}'")]
    UndefinedSource(String),

    #[error("{} structural violations found", .0.len())]
    Invalid(Vec<BuilderError>),
}

/// The destination set handed to `connect_condition`/`connect_task`,
/// optionally carrying the `route` callback a `xor`/`or` split consults
/// at firing time (spec §4.1: "`to` is a builder that can enumerate
/// successor tasks/conditions and ... attach a `route` callback").
#[derive(Clone, Default)]
pub struct ConnectTo {
    pub(crate) targets: Vec<FlowTarget>,
    pub(crate) route: Option<RouteFn>,
}

impl ConnectTo {
    pub fn condition(name: impl Into<String>) -> Self {
        Self {
            targets: vec![FlowTarget::Condition(name.into())],
            route: None,
        }
    }

    pub fn conditions(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            targets: names.into_iter().map(|n| FlowTarget::Condition(n.into())).collect(),
            route: None,
        }
    }

    pub fn task(name: impl Into<String>) -> Self {
        Self {
            targets: vec![FlowTarget::Task(name.into())],
            route: None,
        }
    }

    pub fn tasks(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            targets: names.into_iter().map(|n| FlowTarget::Task(n.into())).collect(),
            route: None,
        }
    }

    pub fn with_route(mut self, route: RouteFn) -> Self {
        self.route = Some(route);
        self
    }
}

/// Options shared by every task-registration method, folding the spec's
/// separate `withActivities`/`withActions` calls into the call that
/// creates the task (ergonomic collapse; semantics unchanged).
pub struct TaskOptions {
    pub split_type: SplitType,
    pub join_type: JoinType,
    pub stats_shard_count: u32,
    pub activities: Activities,
    pub policy: PolicyFn,
    pub instantiation_action: Option<ActionDefinition>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            split_type: SplitType::default(),
            join_type: JoinType::default(),
            stats_shard_count: 8,
            activities: Activities::default(),
            policy: crate::element::policy::DefaultPolicy::as_fn(),
            instantiation_action: None,
        }
    }
}

pub struct WorkflowDefinitionBuilder {
    name: String,
    version_name: String,
    is_deprecated: bool,
    start_condition_name: Option<String>,
    end_condition_name: Option<String>,
    start_condition_calls: u32,
    end_condition_calls: u32,
    tasks: HashMap<String, TaskDefinition>,
    conditions: HashMap<String, ConditionDefinition>,
    cancellation_regions: HashMap<String, CancellationRegion>,
    migration: Option<MigrationDefinition>,
    activities: WorkflowActivities,
    cancel_action: Option<ActionDefinition>,
    errors: Vec<BuilderError>,
}

impl WorkflowDefinitionBuilder {
    pub fn new(name: impl Into<String>, version_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_name: version_name.into(),
            is_deprecated: false,
            start_condition_name: None,
            end_condition_name: None,
            start_condition_calls: 0,
            end_condition_calls: 0,
            tasks: HashMap::new(),
            conditions: HashMap::new(),
            cancellation_regions: HashMap::new(),
            migration: None,
            activities: WorkflowActivities::default(),
            cancel_action: None,
            errors: Vec::new(),
        }
    }

    pub fn with_workflow_activities(mut self, activities: WorkflowActivities) -> Self {
        self.activities = activities;
        self
    }

    pub fn with_cancel_action(mut self, action: ActionDefinition) -> Self {
        self.cancel_action = Some(action);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.is_deprecated = true;
        self
    }

    pub fn start_condition(mut self, name: impl Into<String>) -> Self {
        self.start_condition_calls += 1;
        let name = name.into();
        self.conditions
            .entry(name.clone())
            .or_insert_with(|| ConditionDefinition::new(name.clone()));
        self.start_condition_name = Some(name);
        self
    }

    pub fn end_condition(mut self, name: impl Into<String>) -> Self {
        self.end_condition_calls += 1;
        let name = name.into();
        self.conditions
            .entry(name.clone())
            .or_insert_with(|| ConditionDefinition::new(name.clone()));
        self.end_condition_name = Some(name);
        self
    }

    /// Registers an intermediate condition (not the start or end place).
    pub fn condition(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.conditions.insert(name.clone(), ConditionDefinition::new(name.clone())).is_some() {
            self.errors.push(BuilderError::DuplicateConditionName(name));
        }
        self
    }

    fn insert_task(&mut self, name: String, kind: TaskKind, options: TaskOptions) {
        if self.tasks.contains_key(&name) {
            self.errors.push(BuilderError::DuplicateTaskName(name));
            return;
        }
        self.tasks.insert(
            name.clone(),
            TaskDefinition {
                name,
                kind,
                split_type: options.split_type,
                join_type: options.join_type,
                stats_shard_count: options.stats_shard_count,
                activities: options.activities,
                policy: options.policy,
                instantiation_action: options.instantiation_action,
                outgoing: Vec::new(),
                route: None,
            },
        );
    }

    pub fn task(
        mut self,
        name: impl Into<String>,
        work_item: WorkItemDefinition,
        options: TaskOptions,
    ) -> Self {
        let name = name.into();
        self.insert_task(name, TaskKind::Atomic(work_item), options);
        self
    }

    pub fn dummy_task(mut self, name: impl Into<String>, options: TaskOptions) -> Self {
        let name = name.into();
        self.insert_task(name, TaskKind::Dummy, options);
        self
    }

    pub fn composite_task(
        mut self,
        name: impl Into<String>,
        child: WorkflowDefinition,
        options: TaskOptions,
    ) -> Self {
        let name = name.into();
        self.insert_task(name, TaskKind::Composite(Box::new(child)), options);
        self
    }

    pub fn dynamic_composite_task(
        mut self,
        name: impl Into<String>,
        children: HashMap<String, WorkflowDefinition>,
        options: TaskOptions,
    ) -> Self {
        let name = name.into();
        self.insert_task(name, TaskKind::DynamicComposite(children), options);
        self
    }

    pub fn connect_condition(mut self, name: &str, to: ConnectTo) -> Self {
        match self.conditions.get_mut(name) {
            Some(condition) => {
                condition.outgoing.extend(to.targets.into_iter().map(Flow::new));
            }
            None => self.errors.push(BuilderError::UndefinedSource(name.to_string())),
        }
        self
    }

    pub fn connect_task(mut self, name: &str, to: ConnectTo) -> Self {
        match self.tasks.get_mut(name) {
            Some(task) => {
                task.outgoing.extend(to.targets.into_iter().map(Flow::new));
                if to.route.is_some() {
                    task.route = to.route;
                }
            }
            None => self.errors.push(BuilderError::UndefinedSource(name.to_string())),
        }
        self
    }

    pub fn with_cancellation_region(
        mut self,
        task_name: impl Into<String>,
        region: CancellationRegion,
    ) -> Self {
        self.cancellation_regions.insert(task_name.into(), region);
        self
    }

    pub fn with_migration(mut self, migration: MigrationDefinition) -> Self {
        self.migration = Some(migration);
        self
    }

    /// Runs the full validation pass and, if it finds no violations,
    /// returns the finished [`WorkflowDefinition`].
    pub fn build(mut self) -> Result<WorkflowDefinition, BuilderError> {
        let mut errors = std::mem::take(&mut self.errors);

        if self.start_condition_calls != 1 {
            errors.push(BuilderError::MissingOrDuplicateStartCondition(
                self.start_condition_calls,
            ));
        }
        if self.end_condition_calls != 1 {
            errors.push(BuilderError::MissingOrDuplicateEndCondition(
                self.end_condition_calls,
            ));
        }

        for condition in self.conditions.values() {
            for flow in &condition.outgoing {
                if let FlowTarget::Task(t) = &flow.to {
                    if !self.tasks.contains_key(t) {
                        errors.push(BuilderError::DanglingFlow {
                            from: condition.name.clone(),
                            to: t.clone(),
                            kind: "task",
                        });
                    }
                } else if let FlowTarget::Condition(c) = &flow.to {
                    if !self.conditions.contains_key(c) {
                        errors.push(BuilderError::DanglingFlow {
                            from: condition.name.clone(),
                            to: c.clone(),
                            kind: "condition",
                        });
                    }
                }
            }
        }

        for task in self.tasks.values() {
            for flow in &task.outgoing {
                match &flow.to {
                    FlowTarget::Condition(c) if !self.conditions.contains_key(c) => {
                        errors.push(BuilderError::DanglingFlow {
                            from: task.name.clone(),
                            to: c.clone(),
                            kind: "condition",
                        });
                    }
                    FlowTarget::Task(t) if !self.tasks.contains_key(t) => {
                        errors.push(BuilderError::DanglingFlow {
                            from: task.name.clone(),
                            to: t.clone(),
                            kind: "task",
                        });
                    }
                    _ => {}
                }
            }

            if task.outgoing.is_empty() {
                errors.push(BuilderError::TaskMissingOutgoing(task.name.clone()));
            }
            if matches!(task.join_type, JoinType::And | JoinType::Or | JoinType::Xor)
                && !self
                    .conditions
                    .values()
                    .any(|c| c.outgoing.iter().any(|f| matches!(&f.to, FlowTarget::Task(t) if t == &task.name)))
            {
                errors.push(BuilderError::TaskMissingIncoming(task.name.clone()));
            }

            if !matches!(task.split_type, SplitType::And) && task.route.is_none() {
                errors.push(BuilderError::MissingRouteFunction(task.name.clone()));
            }
        }

        for (task_name, region) in &self.cancellation_regions {
            for t in &region.tasks {
                if !self.tasks.contains_key(t) {
                    errors.push(BuilderError::UnknownCancellationTarget {
                        task: task_name.clone(),
                        target: t.clone(),
                        kind: "task",
                    });
                }
            }
            for c in &region.conditions {
                if !self.conditions.contains_key(c) {
                    errors.push(BuilderError::UnknownCancellationTarget {
                        task: task_name.clone(),
                        target: c.clone(),
                        kind: "condition",
                    });
                }
            }
        }

        // Reachability from the start condition (spec §3: "every task
        // reachable from start"), only meaningful once start/end are sane.
        if let Some(start) = &self.start_condition_name {
            if self.conditions.contains_key(start) {
                let reachable = reachable_tasks(start, &self.conditions, &self.tasks);
                for task_name in self.tasks.keys() {
                    if !reachable.contains(task_name) {
                        errors.push(BuilderError::UnreachableTask(task_name.clone()));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(BuilderError::Invalid(errors));
        }

        Ok(WorkflowDefinition {
            name: self.name,
            version_name: self.version_name,
            is_deprecated: self.is_deprecated,
            start_condition_name: self.start_condition_name.expect("validated above"),
            end_condition_name: self.end_condition_name.expect("validated above"),
            tasks: self.tasks,
            conditions: self.conditions,
            cancellation_regions: self.cancellation_regions,
            migration: self.migration,
            activities: self.activities,
            cancel_action: self.cancel_action,
        })
    }
}

fn reachable_tasks(
    start: &str,
    conditions: &HashMap<String, ConditionDefinition>,
    tasks: &HashMap<String, TaskDefinition>,
) -> std::collections::HashSet<String> {
    let mut seen_conditions = std::collections::HashSet::new();
    let mut seen_tasks = std::collections::HashSet::new();
    let mut stack = vec![FlowTarget::Condition(start.to_string())];

    while let Some(node) = stack.pop() {
        match node {
            FlowTarget::Condition(name) => {
                if !seen_conditions.insert(name.clone()) {
                    continue;
                }
                if let Some(condition) = conditions.get(&name) {
                    for flow in &condition.outgoing {
                        stack.push(flow.to.clone());
                    }
                }
            }
            FlowTarget::Task(name) => {
                if !seen_tasks.insert(name.clone()) {
                    continue;
                }
                if let Some(task) = tasks.get(&name) {
                    for flow in &task.outgoing {
                        stack.push(flow.to.clone());
                    }
                }
            }
        }
    }

    seen_tasks
}
