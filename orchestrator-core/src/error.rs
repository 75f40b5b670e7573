//! Top-level error type for the orchestrator engine.
//!
//! Individual subsystems (the builder, the transactional store, the
//! scheduler bridge, the audit bridge) define their own focused error
//! enums and convert into [`OrchestratorError`] via `#[from]`, mirroring
//! how `StoreError`/`ExecutorError`/`RegistryError` stay separate but
//! compose in the durable-execution engine this crate descends from.

use uuid::Uuid;

use crate::audit::AuditError;
use crate::element::BuilderError;
use crate::persistence::StoreError;
use crate::scheduler::SchedulerError;

/// Errors surfaced by the orchestrator's public API.
///
/// Variant names follow the error kinds named in the engine's design: each
/// kind must be distinguishable by callers, but the exact message is not a
/// stability contract.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A referenced id (workflow, task, work item, condition, migration) does not exist.
    #[error("entity not found: {kind} {id}")]
    EntityNotFound { kind: &'static str, id: String },

    /// An operation was attempted from a state that does not permit it,
    /// e.g. completing a work item that is still `initialized`.
    #[error("invalid state transition on {entity} {id}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// A graph invariant was violated (missing start/end condition, dangling
    /// flow, cancellation region target absent).
    #[error("structural integrity violation: {0}")]
    StructuralIntegrity(#[from] BuilderError),

    /// Policy denied the operation, a work-item claim failed, a migrator
    /// both fast-forwarded and initialized a child, or schema validation
    /// failed.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A cross-reference mismatch was detected (e.g. a payload field
    /// contradicts the entity it is attached to).
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// Required configuration (authorization groups, engine knobs) is
    /// missing or inconsistent at setup time.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// A migration could not proceed: source/target version mismatch, or
    /// the migration finalizer raised.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// The transactional store rejected the mutation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The scheduler bridge rejected a registration or cancellation.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The audit bridge was asked to mutate a span it has no record of.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

impl OrchestratorError {
    pub fn entity_not_found(kind: &'static str, id: impl Into<Uuid>) -> Self {
        Self::EntityNotFound {
            kind,
            id: id.into().to_string(),
        }
    }

    pub fn entity_not_found_named(kind: &'static str, name: impl Into<String>) -> Self {
        Self::EntityNotFound {
            kind,
            id: name.into(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidStateTransition {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
