//! Flowdesk Database Layer
//!
//! Repository traits for templates, status templates, workflow instances and
//! notifications, with PostgreSQL and in-memory implementations.

pub mod db;

// Re-exports: repository contracts
pub use db::{
    DeleteOutcome, NotificationRepositoryTrait, StatusTemplateRepositoryTrait,
    TemplateRepositoryTrait, WorkflowChangeSet, WorkflowRepositoryTrait,
};

// Re-exports: implementations
pub use db::{
    MemoryStore, PostgresNotificationRepository, PostgresStatusTemplateRepository,
    PostgresTemplateRepository, PostgresWorkflowRepository,
};

// Re-exports: pool setup and transaction utilities
pub use db::setup::{connect_pool, run_migrations, setup_database};
pub use db::transaction::TransactionGuard;
