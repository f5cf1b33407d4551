use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use flowdesk_core::models::{
    CreateTemplateRequest, TemplateStepInput, UpdateTemplateRequest, Visibility,
    WorkflowTemplate, WorkflowTemplateStep,
};
use flowdesk_core::validation::validate_step_orders;
use flowdesk_core::AppError;
use flowdesk_db::DeleteOutcome;

use crate::collaborators::{DirectoryService, Permission, TeamRegistry};
use crate::store::EngineStore;

/// Workflow template definitions and who may select them.
///
/// Visibility:
/// - `public`: every user
/// - `team`: members of the template's team, plus its creator
/// - `restricted`: the creator and holders of `ViewAllTemplates`
#[derive(Clone)]
pub struct TemplateCatalog {
    store: EngineStore,
    directory: Arc<dyn DirectoryService>,
    teams: Arc<dyn TeamRegistry>,
}

fn build_steps(template_id: Uuid, inputs: &[TemplateStepInput]) -> Vec<WorkflowTemplateStep> {
    let mut steps: Vec<WorkflowTemplateStep> = inputs
        .iter()
        .map(|input| WorkflowTemplateStep {
            id: Uuid::new_v4(),
            template_id,
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            step_order: input.step_order,
        })
        .collect();
    steps.sort_by_key(|s| s.step_order);
    steps
}

fn validate_step_inputs(inputs: &[TemplateStepInput]) -> Result<(), AppError> {
    for input in inputs {
        input.validate()?;
    }
    let orders: Vec<i32> = inputs.iter().map(|s| s.step_order).collect();
    validate_step_orders(&orders)
}

impl TemplateCatalog {
    pub fn new(
        store: EngineStore,
        directory: Arc<dyn DirectoryService>,
        teams: Arc<dyn TeamRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            teams,
        }
    }

    async fn check_team(
        &self,
        visibility: Visibility,
        team_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        match team_id {
            Some(team_id) => {
                if !self.teams.team_exists(team_id).await? {
                    return Err(AppError::not_found("Team", team_id));
                }
                Ok(())
            }
            None if visibility == Visibility::Team => Err(AppError::Validation(
                "Team-visible templates need a team_id".to_string(),
            )),
            None => Ok(()),
        }
    }

    #[tracing::instrument(skip(self, request), fields(template.name = %request.name))]
    pub async fn create_template(
        &self,
        request: CreateTemplateRequest,
        creator_id: Uuid,
    ) -> Result<WorkflowTemplate, AppError> {
        request.validate()?;
        validate_step_inputs(&request.steps)?;
        self.check_team(request.visibility, request.team_id).await?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let template = WorkflowTemplate {
            id,
            name: request.name.trim().to_string(),
            description: request.description,
            visibility: request.visibility,
            team_id: request.team_id,
            created_by: creator_id,
            steps: build_steps(id, &request.steps),
            created_at: now,
            updated_at: now,
        };

        self.store
            .bounded("insert_template", self.store.templates().insert_template(&template))
            .await?;

        tracing::info!(
            template_id = %template.id,
            steps = template.steps.len(),
            visibility = %template.visibility,
            "Workflow template created"
        );
        Ok(template)
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<WorkflowTemplate, AppError> {
        self.store.require_template(template_id).await
    }

    /// Steps ordered by `step_order`
    pub async fn get_steps(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<WorkflowTemplateStep>, AppError> {
        Ok(self.store.require_template(template_id).await?.steps)
    }

    pub async fn can_view(
        &self,
        template: &WorkflowTemplate,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        if template.created_by == user_id {
            return Ok(true);
        }
        match template.visibility {
            Visibility::Public => Ok(true),
            Visibility::Team => match template.team_id {
                Some(team_id) => self.teams.is_team_member(user_id, team_id).await,
                None => Ok(false),
            },
            Visibility::Restricted => {
                self.directory
                    .has_permission(user_id, Permission::ViewAllTemplates)
                    .await
            }
        }
    }

    /// Templates `user_id` may select, ordered by name.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_templates_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkflowTemplate>, AppError> {
        let all = self
            .store
            .bounded("list_templates", self.store.templates().list_templates())
            .await?;
        let mut visible = Vec::with_capacity(all.len());
        for template in all {
            if self.can_view(&template, user_id).await? {
                visible.push(template);
            }
        }
        Ok(visible)
    }

    /// Load a template for workflow creation, failing with `PermissionDenied` when
    /// its visibility excludes `user_id`.
    pub async fn ensure_selectable(
        &self,
        template_id: Uuid,
        user_id: Uuid,
    ) -> Result<WorkflowTemplate, AppError> {
        let template = self.store.require_template(template_id).await?;
        if !self.can_view(&template, user_id).await? {
            tracing::warn!(
                template_id = %template_id,
                user_id = %user_id,
                visibility = %template.visibility,
                "Template not selectable by user"
            );
            return Err(AppError::PermissionDenied(format!(
                "Template {} is not visible to user {}",
                template_id, user_id
            )));
        }
        Ok(template)
    }

    fn ensure_owner(template: &WorkflowTemplate, actor_id: Uuid) -> Result<(), AppError> {
        if template.created_by != actor_id {
            return Err(AppError::PermissionDenied(format!(
                "Only the creator may change template {}",
                template.id
            )));
        }
        Ok(())
    }

    /// Header fields and step names may change at any time. Changing the number of
    /// steps is only allowed while no workflow references the template.
    #[tracing::instrument(skip(self, request), fields(template_id = %template_id))]
    pub async fn update_template(
        &self,
        template_id: Uuid,
        request: UpdateTemplateRequest,
        actor_id: Uuid,
    ) -> Result<WorkflowTemplate, AppError> {
        request.validate()?;
        let mut template = self.store.require_template(template_id).await?;
        Self::ensure_owner(&template, actor_id)?;

        if let Some(name) = request.name {
            template.name = name.trim().to_string();
        }
        if let Some(description) = request.description {
            template.description = description;
        }
        if let Some(visibility) = request.visibility {
            template.visibility = visibility;
        }
        if let Some(team_id) = request.team_id {
            template.team_id = team_id;
        }
        self.check_team(template.visibility, template.team_id).await?;

        if let Some(inputs) = request.steps {
            validate_step_inputs(&inputs)?;
            if inputs.len() == template.steps.len() {
                // Same shape: rename in place, keeping step ids
                for input in &inputs {
                    if let Some(step) = template
                        .steps
                        .iter_mut()
                        .find(|s| s.step_order == input.step_order)
                    {
                        step.name = input.name.trim().to_string();
                        step.description = input.description.clone();
                    }
                }
            } else {
                let referencing = self
                    .store
                    .bounded(
                        "count_by_template",
                        self.store.workflows().count_by_template(template_id, true),
                    )
                    .await?;
                if referencing > 0 {
                    return Err(AppError::Conflict(format!(
                        "Template {} is referenced by {} workflow(s); its step count cannot change",
                        template_id, referencing
                    )));
                }
                template.steps = build_steps(template_id, &inputs);
            }
        }

        template.updated_at = Utc::now();
        let updated = self
            .store
            .bounded("update_template", self.store.templates().update_template(&template))
            .await?;
        if !updated {
            return Err(AppError::not_found("Template", template_id));
        }

        tracing::info!(steps = template.steps.len(), "Workflow template updated");
        Ok(template)
    }

    #[tracing::instrument(skip(self), fields(template_id = %template_id))]
    pub async fn delete_template(&self, template_id: Uuid, actor_id: Uuid) -> Result<(), AppError> {
        let template = self.store.require_template(template_id).await?;
        Self::ensure_owner(&template, actor_id)?;

        match self
            .store
            .bounded(
                "delete_template",
                self.store.templates().delete_template_if_unused(template_id),
            )
            .await?
        {
            DeleteOutcome::Deleted => {
                tracing::info!("Workflow template deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(AppError::not_found("Template", template_id)),
            DeleteOutcome::InUse => {
                tracing::warn!("Refusing to delete template referenced by open workflows");
                Err(AppError::Conflict(format!(
                    "Template {} is referenced by non-archived workflows",
                    template_id
                )))
            }
        }
    }
}
