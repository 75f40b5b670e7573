//! The transactional store seam (spec §6).
//!
//! The engine never talks to a concrete database directly — every read
//! and write goes through [`TransactionalStore`], the same way
//! `everruns-durable`'s executor depends on `WorkflowEventStore` rather
//! than a `sqlx::Pool`. [`memory::InMemoryStore`] is the default test
//! double; [`postgres`] is the production JSONB-backed implementation.

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{StoreError, TransactionalStore, WorkflowPatch};
