//! Workflow template models: the reusable ordered list of steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Visibility;
use crate::validation::validate_not_blank;

/// One ordinal stage of a template (`step_order` starts at 1)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WorkflowTemplateStep {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub step_order: i32,
}

/// Template with its steps, ordered by `step_order`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    /// Owning team, meaningful for `Visibility::Team`
    pub team_id: Option<Uuid>,
    pub created_by: Uuid,
    pub steps: Vec<WorkflowTemplateStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn step_count(&self) -> i32 {
        self.steps.len() as i32
    }

    pub fn step(&self, step_order: i32) -> Option<&WorkflowTemplateStep> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    pub fn step_name(&self, step_order: i32) -> Option<&str> {
        self.step(step_order).map(|s| s.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TemplateStepInput {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Step name must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub step_order: i32,
}

/// Request DTO for creating a template
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Template name must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Template must have at least one step"))]
    pub steps: Vec<TemplateStepInput>,
}

/// Request DTO for updating a template. When `steps` is given for a template that
/// workflows already reference, only names/descriptions may differ from the stored steps.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Template name must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub team_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub steps: Option<Vec<TemplateStepInput>>,
}
