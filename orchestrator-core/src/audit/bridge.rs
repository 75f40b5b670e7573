use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::instance::AuditContext;
use crate::persistence::{StoreError, TransactionalStore};

use super::span::{Span, SpanEvent, SpanStatus};

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("unknown span: trace {trace_id} span {span_id}")]
    UnknownSpan { trace_id: String, span_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The audit bridge seam `ExecutionContext` calls through, following
/// `EngineHandle`'s "trait in the shared module, concrete impl owns the
/// state" split. [`InMemoryAuditBridge`] is the one implementation this
/// crate ships; a host could swap in one that exports spans to an
/// external tracing backend instead of buffering them.
#[async_trait]
pub trait AuditBridge: Send + Sync + 'static {
    async fn start_span(
        &self,
        trace_id: &str,
        parent_span_id: Option<&str>,
        operation: &str,
        resource_type: &str,
        resource_name: &str,
    ) -> Result<String, AuditError>;

    async fn complete_span(&self, trace_id: &str, span_id: &str, attrs: Option<Value>) -> Result<(), AuditError>;

    async fn fail_span(&self, trace_id: &str, span_id: &str, err: &str) -> Result<(), AuditError>;

    async fn add_event(&self, trace_id: &str, span_id: &str, name: &str, attributes: Value) -> Result<(), AuditError>;

    /// Drains and returns every span buffered for `trace_id`. Called at
    /// workflow completion/cancellation/failure and incrementally after
    /// work-item transitions, per spec §4.11.
    async fn flush(&self, trace_id: &str) -> Vec<Span>;

    async fn persist_context(&self, ctx: AuditContext) -> Result<(), AuditError>;

    async fn load_context(&self, workflow_id: Uuid) -> Result<Option<AuditContext>, AuditError>;
}

/// Buffers spans per trace in-process and persists [`AuditContext`] rows
/// through the [`TransactionalStore`], mirroring how `tracing`'s span
/// registry is process-local until a subscriber exports it — this bridge
/// is the export step.
pub struct InMemoryAuditBridge {
    buffers: RwLock<HashMap<String, Vec<Span>>>,
    store: Arc<dyn TransactionalStore>,
}

impl InMemoryAuditBridge {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            store,
        }
    }

    fn mutate_span(&self, trace_id: &str, span_id: &str, f: impl FnOnce(&mut Span)) -> Result<(), AuditError> {
        let mut buffers = self.buffers.write();
        let spans = buffers.entry(trace_id.to_string()).or_default();
        let span = spans
            .iter_mut()
            .find(|s| s.span_id == span_id)
            .ok_or_else(|| AuditError::UnknownSpan {
                trace_id: trace_id.to_string(),
                span_id: span_id.to_string(),
            })?;
        f(span);
        Ok(())
    }
}

#[async_trait]
impl AuditBridge for InMemoryAuditBridge {
    #[instrument(skip(self))]
    async fn start_span(
        &self,
        trace_id: &str,
        parent_span_id: Option<&str>,
        operation: &str,
        resource_type: &str,
        resource_name: &str,
    ) -> Result<String, AuditError> {
        let span = Span {
            span_id: Uuid::new_v4().to_string(),
            trace_id: trace_id.to_string(),
            parent_span_id: parent_span_id.map(str::to_string),
            operation: operation.to_string(),
            resource_type: resource_type.to_string(),
            resource_name: resource_name.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: SpanStatus::Running,
            attributes: Value::Null,
            events: Vec::new(),
        };
        debug!(trace_id = %span.trace_id, span_id = %span.span_id, operation = %span.operation, "span started");
        let span_id = span.span_id.clone();
        self.buffers.write().entry(trace_id.to_string()).or_default().push(span);
        Ok(span_id)
    }

    #[instrument(skip(self, attrs))]
    async fn complete_span(&self, trace_id: &str, span_id: &str, attrs: Option<Value>) -> Result<(), AuditError> {
        self.mutate_span(trace_id, span_id, |span| {
            span.status = SpanStatus::Completed;
            span.ended_at = Some(Utc::now());
            if let Some(attrs) = attrs {
                span.attributes = attrs;
            }
        })?;
        info!(trace_id = %trace_id, span_id = %span_id, "span completed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_span(&self, trace_id: &str, span_id: &str, err: &str) -> Result<(), AuditError> {
        self.mutate_span(trace_id, span_id, |span| {
            span.status = SpanStatus::Failed;
            span.ended_at = Some(Utc::now());
            span.events.push(SpanEvent {
                name: "error".to_string(),
                at: Utc::now(),
                attributes: Value::String(err.to_string()),
            });
        })?;
        warn!(trace_id = %trace_id, span_id = %span_id, error = %err, "span failed");
        Ok(())
    }

    async fn add_event(&self, trace_id: &str, span_id: &str, name: &str, attributes: Value) -> Result<(), AuditError> {
        self.mutate_span(trace_id, span_id, |span| {
            span.events.push(SpanEvent {
                name: name.to_string(),
                at: Utc::now(),
                attributes,
            })
        })
    }

    async fn flush(&self, trace_id: &str) -> Vec<Span> {
        self.buffers.write().remove(trace_id).unwrap_or_default()
    }

    async fn persist_context(&self, ctx: AuditContext) -> Result<(), AuditError> {
        self.store.upsert_audit_context(ctx).await?;
        Ok(())
    }

    async fn load_context(&self, workflow_id: Uuid) -> Result<Option<AuditContext>, AuditError> {
        Ok(self.store.get_audit_context(workflow_id).await?)
    }
}
