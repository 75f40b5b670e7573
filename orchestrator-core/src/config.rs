//! Engine-wide configuration knobs.

/// Tunables for the orchestrator engine, analogous to `ExecutorConfig` in
/// the durable-execution engine this crate descends from: a small struct
/// of safety caps and defaults passed once at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on how many entries the [`crate::context::WorkItemAutoTriggerQueue`]
    /// will drain within a single mutation before refusing to enqueue more.
    /// Guards against a runaway `onInitialized -> start -> onStarted -> ...`
    /// cycle authored by buggy workflow code.
    pub max_auto_trigger_queue_depth: usize,

    /// Default `statsShardCount` for a [`crate::element::TaskDefinition`]
    /// that does not override it (spec default: 8).
    pub default_stats_shard_count: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_trigger_queue_depth: 256,
            default_stats_shard_count: 8,
        }
    }
}

impl EngineConfig {
    pub fn with_max_auto_trigger_queue_depth(mut self, depth: usize) -> Self {
        self.max_auto_trigger_queue_depth = depth;
        self
    }

    pub fn with_default_stats_shard_count(mut self, count: u32) -> Self {
        self.default_stats_shard_count = count;
        self
    }
}
