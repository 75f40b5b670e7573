//! Scheduler bridge (spec §4.10).
//!
//! The engine never sleeps itself — it asks a host-provided
//! [`SchedulerHandle`] for a one-shot delayed callback and remembers the
//! returned id in a reverse index keyed by `{workflow, task/generation,
//! work item}`, the same "depend on a small trait, keep your own index"
//! split `everruns-durable` uses between `reliability::timeout` (policy)
//! and `persistence::WorkflowEventStore` (storage). [`bridge::SchedulerBridge`]
//! is the piece the engine actually calls; [`handle::InMemorySchedulerHandle`]
//! is the test double.

mod bridge;
mod handle;

pub use bridge::{DefaultSchedulerBridge, SchedulerBridge, SchedulerError};
pub use handle::{InMemorySchedulerHandle, ScheduledFunction, ScheduledState, SchedulerHandle};
