//! Read-only dashboard projections

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TeamWorkflowStats {
    pub team_id: Option<Uuid>,
    pub total: i64,
    pub completed: i64,
    pub overdue: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateWorkflowStats {
    pub template_id: Uuid,
    pub template_name: String,
    pub total: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneralWorkflowStats {
    pub total_workflows: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub by_visibility: BTreeMap<String, i64>,
    pub overdue_count: i64,
    pub near_deadline_count: i64,
    pub on_track_count: i64,
    pub completed_count: i64,
    /// completed / total, 0.0 when there are no workflows
    pub completion_rate: f64,
    /// completed on time / completed, 0.0 when nothing completed
    pub on_time_completion_rate: f64,
    /// Mean of `completion_date - start_date` over completed assignments, in hours
    pub average_time_per_step_hours: Option<f64>,
    pub by_team: Vec<TeamWorkflowStats>,
    pub by_template: Vec<TemplateWorkflowStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserWorkflowStats {
    pub user_id: Uuid,
    pub created_count: i64,
    /// Workflows where the user holds the active assignment of the current step
    pub assigned_count: i64,
    pub completed_count: i64,
    pub overdue_count: i64,
    pub near_deadline_count: i64,
    pub by_status: BTreeMap<String, i64>,
    pub pending_assignments: i64,
    pub in_progress_assignments: i64,
    pub completed_assignments: i64,
    pub average_time_per_step_hours: Option<f64>,
}
