//! # Orchestrator Core
//!
//! A YAWL-style workflow orchestration engine: conditions and tasks form a
//! Petri net, work items are the claimable units of human or automated
//! work an atomic task hands out, and composite tasks nest whole
//! sub-workflow instances inside a parent run.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Engine                              │
//! │  (drives the net: enable/start/complete/cancel, OR-join       │
//! │   reachability, the work-item auto-trigger queue)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!            ┌─────────────────┼─────────────────┐
//!            ▼                 ▼                 ▼
//! ┌────────────────────┐ ┌───────────────┐ ┌──────────────────┐
//! │ TransactionalStore  │ │SchedulerBridge│ │   AuditBridge    │
//! │ (workflow/task/     │ │  (delayed     │ │ (span tracing,   │
//! │  work-item rows)    │ │   callbacks)  │ │  trace context)  │
//! └────────────────────┘ └───────────────┘ └──────────────────┘
//! ```
//!
//! [`element`] holds the static, immutable definition graph built once
//! through [`element::WorkflowDefinitionBuilder`] and registered with an
//! [`engine::Engine`]; [`instance`] holds the per-run rows a
//! [`persistence::TransactionalStore`] implementation persists.
//!
//! ## Example
//!
//! ```ignore
//! use orchestrator_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), OrchestratorError> {
//! let store = Arc::new(InMemoryStore::new());
//! let scheduler = Arc::new(DefaultSchedulerBridge::new(
//!     Arc::new(InMemorySchedulerHandle::new()),
//!     store.clone(),
//! ));
//! let audit = Arc::new(InMemoryAuditBridge::new(store.clone()));
//! let engine = Engine::new(store, scheduler, audit, EngineConfig::default());
//!
//! let definition = WorkflowDefinitionBuilder::new("approval", "v1")
//!     .start_condition("start")
//!     .end_condition("end")
//!     .build()?;
//! engine.registry.register(definition);
//!
//! let workflow_id = engine
//!     .initialize_root_workflow(WorkflowVersion::new("approval", "v1"), serde_json::json!({}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod element;
pub mod engine;
pub mod error;
pub mod instance;
pub mod marking;
pub mod orjoin;
pub mod persistence;
pub mod scheduler;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::audit::{AuditBridge, AuditError, InMemoryAuditBridge};
    pub use crate::config::EngineConfig;
    pub use crate::context::{EngineHandle, ExecutionContext, ExecutionMode};
    pub use crate::element::{
        BuilderError, ConnectTo, TaskOptions, WorkflowActivities, WorkflowDefinition,
        WorkflowDefinitionBuilder, WorkflowVersion,
    };
    pub use crate::engine::{Engine, WorkflowRegistry};
    pub use crate::error::OrchestratorError;
    pub use crate::instance::{TaskState, WorkItemState, WorkflowInstance, WorkflowState};
    pub use crate::persistence::{InMemoryStore, PostgresStore, StoreError, TransactionalStore};
    pub use crate::scheduler::{
        DefaultSchedulerBridge, InMemorySchedulerHandle, SchedulerBridge, SchedulerError,
        SchedulerHandle,
    };
}

// Re-export key types at crate root.
pub use config::EngineConfig;
pub use engine::{Engine, WorkflowRegistry};
pub use error::OrchestratorError;
pub use persistence::{InMemoryStore, PostgresStore, StoreError, TransactionalStore};
