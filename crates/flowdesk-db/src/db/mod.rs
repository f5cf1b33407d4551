//! Database repositories for the workflow engine
//!
//! `traits` defines the abstract store, `postgres/` implements it on sqlx and
//! `memory` implements it in-process.
//
// Repository contracts and the change-set unit of work
pub mod traits;
//
// Implementations
pub mod memory;
pub mod postgres;
//
// Pool, migrations and transaction utilities
pub mod setup;
pub mod transaction;

pub use memory::MemoryStore;
pub use postgres::{
    PostgresNotificationRepository, PostgresStatusTemplateRepository,
    PostgresTemplateRepository, PostgresWorkflowRepository,
};
pub use traits::{
    DeleteOutcome, NotificationRepositoryTrait, StatusTemplateRepositoryTrait,
    TemplateRepositoryTrait, WorkflowChangeSet, WorkflowRepositoryTrait,
};
