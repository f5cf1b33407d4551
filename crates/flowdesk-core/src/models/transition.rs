use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Assignment,
    StatusChange,
    StepChange,
}

impl Display for TransitionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransitionType::Assignment => write!(f, "assignment"),
            TransitionType::StatusChange => write!(f, "status_change"),
            TransitionType::StepChange => write!(f, "step_change"),
        }
    }
}

/// Append-only audit record of a state change. Never updated or deleted except by
/// cascade when its workflow is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WorkflowTransition {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub from_step: Option<i32>,
    pub to_step: Option<i32>,
    /// Lifecycle status name, custom status item name or assignment status name
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub comments: Option<String>,
    pub transition_type: TransitionType,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
