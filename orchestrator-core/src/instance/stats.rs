//! Sharded per-task counters (spec §4.9).
//!
//! Each `(workflowId, taskName, generation)` tuple has `statsShardCount`
//! rows; a child entity's transitions always patch the same shard
//! (selected by hashing its id), so its successive transitions serialize
//! through one row even though reads aggregate across all shards.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An aggregated read over all shards for one `(workflowId, taskName,
/// generation)` — what a task's [`crate::element::PolicyFn`] and
/// `getAggregatedTaskStats` both consume.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: u32,
    pub initialized: u32,
    pub started: u32,
    pub completed: u32,
    pub failed: u32,
    pub canceled: u32,
}

impl TaskStats {
    pub fn add(&mut self, other: &TaskStats) {
        self.total += other.total;
        self.initialized += other.initialized;
        self.started += other.started;
        self.completed += other.completed;
        self.failed += other.failed;
        self.canceled += other.canceled;
    }

    pub fn apply_delta(&mut self, delta: &TaskStatsDelta) {
        self.total = (self.total as i64 + delta.total).max(0) as u32;
        self.initialized = (self.initialized as i64 + delta.initialized).max(0) as u32;
        self.started = (self.started as i64 + delta.started).max(0) as u32;
        self.completed = (self.completed as i64 + delta.completed).max(0) as u32;
        self.failed = (self.failed as i64 + delta.failed).max(0) as u32;
        self.canceled = (self.canceled as i64 + delta.canceled).max(0) as u32;
    }
}

/// A signed adjustment applied to exactly one shard when a child entity
/// transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStatsDelta {
    pub total: i64,
    pub initialized: i64,
    pub started: i64,
    pub completed: i64,
    pub failed: i64,
    pub canceled: i64,
}

impl TaskStatsDelta {
    pub fn inserted() -> Self {
        Self {
            total: 1,
            initialized: 1,
            ..Default::default()
        }
    }

    /// Delta for a child moving from `from` to `to`. Every state is
    /// tracked as its own counter, so a transition decrements the source
    /// bucket and increments the destination bucket.
    pub fn transition(from: &str, to: &str) -> Self {
        let mut delta = Self::default();
        Self::bump(&mut delta, from, -1);
        Self::bump(&mut delta, to, 1);
        delta
    }

    fn bump(delta: &mut Self, state: &str, amount: i64) {
        match state {
            "initialized" => delta.initialized += amount,
            "started" => delta.started += amount,
            "completed" => delta.completed += amount,
            "failed" => delta.failed += amount,
            "canceled" => delta.canceled += amount,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatsShard {
    pub workflow_id: Uuid,
    pub task_name: String,
    pub generation: u64,
    pub shard_id: u32,
    pub stats: TaskStats,
}

impl TaskStatsShard {
    pub fn empty(workflow_id: Uuid, task_name: impl Into<String>, generation: u64, shard_id: u32) -> Self {
        Self {
            workflow_id,
            task_name: task_name.into(),
            generation,
            shard_id,
            stats: TaskStats::default(),
        }
    }
}

/// Selects the shard a given entity id's transitions always land on,
/// guaranteeing a stable row for OCC to serialize through.
pub fn shard_for(entity_id: Uuid, shard_count: u32) -> u32 {
    if shard_count == 0 {
        return 0;
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    entity_id.hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as u32
}
