//! Audit bridge (spec §4.11).
//!
//! Spans map onto `tracing::Span`s the way `everruns-durable`'s executor
//! methods carry `#[instrument]`; the piece `tracing` doesn't give us for
//! free is persisted [`AuditContext`](crate::instance::AuditContext)
//! continuation across separate host mutations, so [`bridge::AuditBridge`]
//! buffers spans per trace and flushes them at the boundaries spec §4.11
//! names (workflow completion, cancellation, failure, and incrementally
//! after work-item transitions).

mod bridge;
mod span;

pub use bridge::{AuditBridge, AuditError, InMemoryAuditBridge};
pub use span::{Span, SpanEvent, SpanStatus};
