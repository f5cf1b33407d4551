//! Workflow instance models: the fixed lifecycle state machine, priority and
//! visibility enums, the instance row and its request/filter DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::{WorkflowAssignment, WorkflowStatusItem};
use crate::validation::validate_not_blank;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(anyhow::anyhow!("Invalid priority: {}", s)),
        }
    }
}

/// Who may see a template or workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Restricted,
    Team,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Restricted => "restricted",
            Visibility::Team => "team",
        }
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "restricted" => Ok(Visibility::Restricted),
            "team" => Ok(Visibility::Team),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

/// Fixed lifecycle of a workflow instance.
///
/// Allowed edges:
///
/// ```text
/// in_progress -> paused | completed | canceled
/// paused      -> in_progress | canceled
/// completed   -> archived
/// canceled    -> archived
/// archived    -> in_progress
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    InProgress,
    Paused,
    Completed,
    Canceled,
    Archived,
}

impl LifecycleStatus {
    pub const ALL: [LifecycleStatus; 5] = [
        LifecycleStatus::InProgress,
        LifecycleStatus::Paused,
        LifecycleStatus::Completed,
        LifecycleStatus::Canceled,
        LifecycleStatus::Archived,
    ];

    pub fn allowed_targets(self) -> &'static [LifecycleStatus] {
        use LifecycleStatus::*;
        match self {
            InProgress => &[Paused, Completed, Canceled],
            Paused => &[InProgress, Canceled],
            Completed => &[Archived],
            Canceled => &[Archived],
            Archived => &[InProgress],
        }
    }

    pub fn can_transition_to(self, target: LifecycleStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Completed, canceled and archived workflows are never overdue.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleStatus::Completed | LifecycleStatus::Canceled | LifecycleStatus::Archived
        )
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Administrative edges (into or out of `archived`) emit no notification.
    pub fn is_silent_edge(from: LifecycleStatus, to: LifecycleStatus) -> bool {
        to == LifecycleStatus::Archived || from == LifecycleStatus::Archived
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::InProgress => "in_progress",
            LifecycleStatus::Paused => "paused",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::Canceled => "canceled",
            LifecycleStatus::Archived => "archived",
        }
    }
}

impl Display for LifecycleStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(LifecycleStatus::InProgress),
            "paused" => Ok(LifecycleStatus::Paused),
            "completed" => Ok(LifecycleStatus::Completed),
            "canceled" => Ok(LifecycleStatus::Canceled),
            "archived" => Ok(LifecycleStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid lifecycle status: {}", s)),
        }
    }
}

/// Workflow instance (database row)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Workflow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub status_template_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub lifecycle_status: LifecycleStatus,
    pub custom_status_id: Option<Uuid>,
    pub visibility: Visibility,
    pub deadline: Option<DateTime<Utc>>,
    pub team_id: Option<Uuid>,
    pub created_by: Uuid,
    /// 1-indexed, always within `1..=total_steps`
    pub current_step: i32,
    /// Snapshot of the template step count at creation
    pub total_steps: i32,
    pub progress_percentage: i32,
    /// Set on entering `completed`; kept through archival, cleared on restore
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// `floor((current_step - 1) / total_steps * 100)`
    pub fn progress_for_step(current_step: i32, total_steps: i32) -> i32 {
        if total_steps <= 0 {
            return 0;
        }
        let done = i64::from((current_step - 1).max(0));
        (done * 100 / i64::from(total_steps)) as i32
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step >= self.total_steps
    }

    pub fn has_step(&self, step_number: i32) -> bool {
        (1..=self.total_steps).contains(&step_number)
    }
}

/// Request DTO for creating a workflow instance from a template
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkflowRequest {
    pub template_id: Uuid,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Workflow title must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 4000, message = "Description must be at most 4000 characters"))]
    pub description: Option<String>,
    pub priority: Priority,
    pub visibility: Visibility,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub status_template_id: Option<Uuid>,
    /// Assignee of step 1
    pub assign_to: Uuid,
}

/// Request DTO for editing workflow metadata. `Option<Option<_>>` distinguishes
/// "no change" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Workflow title must be between 1 and 255 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub team_id: Option<Option<Uuid>>,
}

/// Filter for listing workflows; every field narrows the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowFilter {
    pub lifecycle_status: Option<LifecycleStatus>,
    pub priority: Option<Priority>,
    pub visibility: Option<Visibility>,
    pub team_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    /// Active assignee of the current step
    pub assigned_to: Option<Uuid>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
}

impl WorkflowFilter {
    /// In-process evaluation of everything except `assigned_to`, which needs the
    /// assignment set.
    pub fn matches_row(&self, workflow: &Workflow) -> bool {
        if let Some(status) = self.lifecycle_status {
            if workflow.lifecycle_status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if workflow.priority != priority {
                return false;
            }
        }
        if let Some(visibility) = self.visibility {
            if workflow.visibility != visibility {
                return false;
            }
        }
        if self.team_id.is_some() && workflow.team_id != self.team_id {
            return false;
        }
        if let Some(template_id) = self.template_id {
            if workflow.template_id != template_id {
                return false;
            }
        }
        if let Some(created_by) = self.created_by {
            if workflow.created_by != created_by {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            if !workflow.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Limit/offset pagination
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 500;

    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }

    /// Unbounded page for internal scans and aggregations.
    pub fn all() -> Self {
        Self {
            limit: i64::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(50, 0)
    }
}

/// One page of a workflow listing plus the unpaginated match count
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPage {
    pub items: Vec<Workflow>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Step as displayed on a workflow: current template name plus its active assignment.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStepView {
    pub step_number: i32,
    pub name: Option<String>,
    pub active_assignment: Option<WorkflowAssignment>,
}

/// Workflow enriched with derived deadline state and display data
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDetails {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub template_name: Option<String>,
    pub is_overdue: bool,
    pub is_near_deadline: bool,
    pub days_remaining: Option<i64>,
    pub current_assignee: Option<Uuid>,
    pub custom_status: Option<WorkflowStatusItem>,
    pub steps: Vec<WorkflowStepView>,
}
