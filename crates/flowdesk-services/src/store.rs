//! Store facade: the four repositories behind one handle, with every call bounded by
//! the configured storage timeout.

use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use flowdesk_core::models::{
    Workflow, WorkflowAssignment, WorkflowStatusTemplate, WorkflowTemplate,
};
use flowdesk_core::AppError;
use flowdesk_db::{
    MemoryStore, NotificationRepositoryTrait, PostgresNotificationRepository,
    PostgresStatusTemplateRepository, PostgresTemplateRepository, PostgresWorkflowRepository,
    StatusTemplateRepositoryTrait, TemplateRepositoryTrait, WorkflowChangeSet,
    WorkflowRepositoryTrait,
};

#[derive(Clone)]
pub struct EngineStore {
    templates: Arc<dyn TemplateRepositoryTrait>,
    status_templates: Arc<dyn StatusTemplateRepositoryTrait>,
    workflows: Arc<dyn WorkflowRepositoryTrait>,
    notifications: Arc<dyn NotificationRepositoryTrait>,
    timeout: Duration,
}

impl EngineStore {
    pub fn new(
        templates: Arc<dyn TemplateRepositoryTrait>,
        status_templates: Arc<dyn StatusTemplateRepositoryTrait>,
        workflows: Arc<dyn WorkflowRepositoryTrait>,
        notifications: Arc<dyn NotificationRepositoryTrait>,
        timeout: Duration,
    ) -> Self {
        Self {
            templates,
            status_templates,
            workflows,
            notifications,
            timeout,
        }
    }

    pub fn in_memory(store: MemoryStore, timeout: Duration) -> Self {
        let shared = Arc::new(store);
        Self::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared,
            timeout,
        )
    }

    pub fn postgres(pool: PgPool, timeout: Duration) -> Self {
        Self::new(
            Arc::new(PostgresTemplateRepository::new(pool.clone())),
            Arc::new(PostgresStatusTemplateRepository::new(pool.clone())),
            Arc::new(PostgresWorkflowRepository::new(pool.clone())),
            Arc::new(PostgresNotificationRepository::new(pool)),
            timeout,
        )
    }

    pub fn templates(&self) -> &dyn TemplateRepositoryTrait {
        self.templates.as_ref()
    }

    pub fn status_templates(&self) -> &dyn StatusTemplateRepositoryTrait {
        self.status_templates.as_ref()
    }

    pub fn workflows(&self) -> &dyn WorkflowRepositoryTrait {
        self.workflows.as_ref()
    }

    pub fn notifications(&self) -> &dyn NotificationRepositoryTrait {
        self.notifications.as_ref()
    }

    /// Run one storage call, failing with `AppError::Storage` once the timeout elapses.
    pub async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Storage call timed out"
                );
                Err(AppError::Storage(format!(
                    "{} did not complete within {:?}",
                    operation, self.timeout
                )))
            }
        }
    }

    pub async fn require_workflow(&self, id: Uuid) -> Result<Workflow, AppError> {
        self.bounded("get_workflow", self.workflows.get_workflow(id))
            .await?
            .ok_or_else(|| AppError::not_found("Workflow", id))
    }

    pub async fn require_template(&self, id: Uuid) -> Result<WorkflowTemplate, AppError> {
        self.bounded("get_template", self.templates.get_template(id))
            .await?
            .ok_or_else(|| AppError::not_found("Template", id))
    }

    pub async fn require_status_template(
        &self,
        id: Uuid,
    ) -> Result<WorkflowStatusTemplate, AppError> {
        self.bounded(
            "get_status_template",
            self.status_templates.get_status_template(id),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Status template", id))
    }

    pub async fn list_assignments(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        self.bounded(
            "list_assignments",
            self.workflows.list_assignments(workflow_id),
        )
        .await
    }

    pub async fn apply_changes(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        self.bounded("apply_changes", self.workflows.apply_changes(changes))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_call_maps_to_storage_error() {
        let store = EngineStore::in_memory(MemoryStore::new(), Duration::from_millis(10));
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, AppError>(())
        };
        let err = store.bounded("slow_call", slow).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let store = EngineStore::in_memory(MemoryStore::new(), Duration::from_secs(1));
        let err = store.require_workflow(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
