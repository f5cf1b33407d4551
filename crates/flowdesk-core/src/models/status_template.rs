//! Pluggable custom status sets that a workflow can carry next to its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{validate_color, validate_not_blank};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WorkflowStatusItem {
    pub id: Uuid,
    pub status_template_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub order_index: i32,
    pub is_initial: bool,
    pub is_final: bool,
}

/// Status template with items ordered by `order_index`. Exactly one item is initial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStatusTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub items: Vec<WorkflowStatusItem>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowStatusTemplate {
    pub fn initial_item(&self) -> Option<&WorkflowStatusItem> {
        self.items.iter().find(|i| i.is_initial)
    }

    pub fn item(&self, item_id: Uuid) -> Option<&WorkflowStatusItem> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StatusItemInput {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Status name must be between 1 and 100 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    pub order_index: i32,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStatusTemplateRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Status template name must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Status template must have at least one item"))]
    pub items: Vec<StatusItemInput>,
}
