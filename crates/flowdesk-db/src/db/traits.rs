//! Repository traits: the abstract store the engine is written against.
//!
//! Implementations: [`crate::db::postgres`] (sqlx/PostgreSQL) and
//! [`crate::db::memory::MemoryStore`] (process-local, used by tests and embedders).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use flowdesk_core::models::{
    Page, Workflow, WorkflowAssignment, WorkflowFilter, WorkflowNotification,
    WorkflowStatusTemplate, WorkflowTemplate, WorkflowTransition,
};
use flowdesk_core::AppError;

/// Everything one state-machine mutation writes. Applied all-or-nothing.
#[derive(Debug, Clone)]
pub struct WorkflowChangeSet {
    pub workflow: Workflow,
    /// `updated_at` the engine read before mutating; `None` when inserting a new workflow.
    /// A mismatch at apply time aborts the change set with `AppError::Conflict`.
    pub expected_updated_at: Option<DateTime<Utc>>,
    /// Upserts keyed by assignment id, applied in order
    pub assignments: Vec<WorkflowAssignment>,
    pub transition: WorkflowTransition,
    pub notifications: Vec<WorkflowNotification>,
}

/// Result of a conditional delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// A non-archived workflow still references the record
    InUse,
}

#[async_trait::async_trait]
pub trait TemplateRepositoryTrait: Send + Sync {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), AppError>;

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, AppError>;

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, AppError>;

    /// Replace header fields and the step list. `false` when the template does not exist.
    async fn update_template(&self, template: &WorkflowTemplate) -> Result<bool, AppError>;

    /// Delete unless a non-archived workflow references the template (checked atomically).
    async fn delete_template_if_unused(&self, id: Uuid) -> Result<DeleteOutcome, AppError>;
}

#[async_trait::async_trait]
pub trait StatusTemplateRepositoryTrait: Send + Sync {
    async fn insert_status_template(
        &self,
        template: &WorkflowStatusTemplate,
    ) -> Result<(), AppError>;

    async fn get_status_template(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowStatusTemplate>, AppError>;

    async fn list_status_templates(&self) -> Result<Vec<WorkflowStatusTemplate>, AppError>;

    async fn delete_status_template_if_unused(
        &self,
        id: Uuid,
    ) -> Result<DeleteOutcome, AppError>;
}

#[async_trait::async_trait]
pub trait WorkflowRepositoryTrait: Send + Sync {
    /// Insert a new workflow with its first assignment, transition and notifications.
    async fn insert_workflow(&self, changes: &WorkflowChangeSet) -> Result<(), AppError>;

    /// Apply a mutation of an existing workflow atomically, guarded by
    /// `changes.expected_updated_at`.
    async fn apply_changes(&self, changes: &WorkflowChangeSet) -> Result<(), AppError>;

    /// Overwrite metadata columns only (title, description, priority, visibility,
    /// deadline, team), guarded by the optimistic `updated_at` check.
    async fn update_workflow_details(
        &self,
        workflow: &Workflow,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, AppError>;

    /// Newest first
    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
        page: Page,
    ) -> Result<Vec<Workflow>, AppError>;

    async fn count_workflows(&self, filter: &WorkflowFilter) -> Result<i64, AppError>;

    async fn count_by_template(
        &self,
        template_id: Uuid,
        include_archived: bool,
    ) -> Result<i64, AppError>;

    /// Oldest first
    async fn list_assignments(&self, workflow_id: Uuid)
        -> Result<Vec<WorkflowAssignment>, AppError>;

    async fn list_assignments_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError>;

    async fn list_all_assignments(&self) -> Result<Vec<WorkflowAssignment>, AppError>;

    /// Ledger order (oldest first)
    async fn list_transitions(&self, workflow_id: Uuid)
        -> Result<Vec<WorkflowTransition>, AppError>;

    /// Cascade delete of the workflow, its assignments, transitions and notifications
    async fn delete_workflow(&self, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait::async_trait]
pub trait NotificationRepositoryTrait: Send + Sync {
    async fn insert_notification(
        &self,
        notification: &WorkflowNotification,
    ) -> Result<(), AppError>;

    /// Newest first
    async fn list_notifications_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<WorkflowNotification>, AppError>;

    /// `false` when no such notification exists; already-read rows report `true`.
    async fn mark_read(&self, id: Uuid) -> Result<bool, AppError>;

    /// Number of rows that flipped from unread to read
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError>;
}
