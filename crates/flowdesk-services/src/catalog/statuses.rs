use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use flowdesk_core::models::{
    CreateStatusTemplateRequest, WorkflowStatusItem, WorkflowStatusTemplate,
};
use flowdesk_core::validation::validate_status_items;
use flowdesk_core::AppError;
use flowdesk_db::DeleteOutcome;

use crate::store::EngineStore;

/// Custom status sets a workflow can carry next to its lifecycle status.
#[derive(Clone)]
pub struct StatusCatalog {
    store: EngineStore,
}

impl StatusCatalog {
    pub fn new(store: EngineStore) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, request), fields(status_template.name = %request.name))]
    pub async fn create_status_template(
        &self,
        request: CreateStatusTemplateRequest,
        creator_id: Uuid,
    ) -> Result<WorkflowStatusTemplate, AppError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }
        validate_status_items(&request.items)?;

        let id = Uuid::new_v4();
        let mut items: Vec<WorkflowStatusItem> = request
            .items
            .iter()
            .map(|input| WorkflowStatusItem {
                id: Uuid::new_v4(),
                status_template_id: id,
                name: input.name.trim().to_string(),
                color: input.color.clone(),
                order_index: input.order_index,
                is_initial: input.is_initial,
                is_final: input.is_final,
            })
            .collect();
        items.sort_by_key(|i| i.order_index);

        let template = WorkflowStatusTemplate {
            id,
            name: request.name.trim().to_string(),
            description: request.description,
            created_by: creator_id,
            items,
            created_at: Utc::now(),
        };

        self.store
            .bounded(
                "insert_status_template",
                self.store.status_templates().insert_status_template(&template),
            )
            .await?;

        tracing::info!(
            status_template_id = %template.id,
            items = template.items.len(),
            "Status template created"
        );
        Ok(template)
    }

    pub async fn get_status_template(
        &self,
        status_template_id: Uuid,
    ) -> Result<WorkflowStatusTemplate, AppError> {
        self.store.require_status_template(status_template_id).await
    }

    pub async fn list_status_templates(&self) -> Result<Vec<WorkflowStatusTemplate>, AppError> {
        self.store
            .bounded(
                "list_status_templates",
                self.store.status_templates().list_status_templates(),
            )
            .await
    }

    /// The item `item_id` of `status_template_id`; `NotFound` when it belongs elsewhere.
    pub async fn resolve_item(
        &self,
        status_template_id: Uuid,
        item_id: Uuid,
    ) -> Result<(WorkflowStatusTemplate, WorkflowStatusItem), AppError> {
        let template = self.store.require_status_template(status_template_id).await?;
        let item = template.item(item_id).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "Status item {} does not belong to status template {}",
                item_id, status_template_id
            ))
        })?;
        Ok((template, item))
    }

    #[tracing::instrument(skip(self), fields(status_template_id = %status_template_id))]
    pub async fn delete_status_template(
        &self,
        status_template_id: Uuid,
        actor_id: Uuid,
    ) -> Result<(), AppError> {
        let template = self.store.require_status_template(status_template_id).await?;
        if template.created_by != actor_id {
            return Err(AppError::PermissionDenied(format!(
                "Only the creator may delete status template {}",
                status_template_id
            )));
        }

        match self
            .store
            .bounded(
                "delete_status_template",
                self.store
                    .status_templates()
                    .delete_status_template_if_unused(status_template_id),
            )
            .await?
        {
            DeleteOutcome::Deleted => {
                tracing::info!("Status template deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => {
                Err(AppError::not_found("Status template", status_template_id))
            }
            DeleteOutcome::InUse => Err(AppError::Conflict(format!(
                "Status template {} is used by non-archived workflows",
                status_template_id
            ))),
        }
    }
}
