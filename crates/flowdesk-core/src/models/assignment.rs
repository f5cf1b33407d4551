use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
        }
    }
}

impl Display for AssignmentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssignmentStatus::Pending),
            "in_progress" => Ok(AssignmentStatus::InProgress),
            "completed" => Ok(AssignmentStatus::Completed),
            _ => Err(anyhow::anyhow!("Invalid assignment status: {}", s)),
        }
    }
}

/// A user's responsibility for one step at one point in time.
///
/// Several rows may exist for the same `(workflow_id, step_number)` (reassignment
/// history); at most one of them is active (`status != completed`). A row completed by
/// reassignment looks the same as one completed by progress; the transition log tells
/// them apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WorkflowAssignment {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_number: i32,
    pub assigned_to: Uuid,
    pub status: AssignmentStatus,
    pub start_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

impl WorkflowAssignment {
    pub fn is_active(&self) -> bool {
        self.status != AssignmentStatus::Completed
    }
}

/// Per-user workload relative to the configured capacity threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserWorkload {
    pub user_id: Uuid,
    /// Assignments not yet completed (pending + in progress)
    pub active: i64,
    pub pending: i64,
    pub in_progress: i64,
    /// Active assignments on overdue workflows
    pub overdue: i64,
    pub total: i64,
    pub workload_percentage: f64,
    pub overloaded: bool,
}
