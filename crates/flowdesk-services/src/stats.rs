//! Read-only aggregation over workflows and assignments for dashboards.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use flowdesk_core::models::{
    AssignmentStatus, GeneralWorkflowStats, LifecycleStatus, Page, Priority,
    TeamWorkflowStats, TemplateWorkflowStats, UserWorkflowStats, UserWorkload, Visibility,
    Workflow, WorkflowAssignment, WorkflowFilter,
};
use flowdesk_core::{deadline_state, AppError, EngineConfig};

use crate::assignments::AssignmentTracker;
use crate::store::EngineStore;

const SECONDS_PER_HOUR: f64 = 3600.0;

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Mean `completion_date - start_date` of completed rows, in hours.
fn average_hours<'a>(assignments: impl Iterator<Item = &'a WorkflowAssignment>) -> Option<f64> {
    let mut count = 0u32;
    let mut seconds = 0i64;
    for a in assignments {
        if a.status != AssignmentStatus::Completed {
            continue;
        }
        if let Some(done) = a.completion_date {
            seconds += (done - a.start_date).num_seconds().max(0);
            count += 1;
        }
    }
    (count > 0).then(|| seconds as f64 / f64::from(count) / SECONDS_PER_HOUR)
}

/// Completed with no deadline, or completed no later than the deadline. Edits after
/// completion move `updated_at` but never `completed_at`.
fn completed_on_time(workflow: &Workflow) -> bool {
    match (workflow.deadline, workflow.completed_at) {
        (None, _) => true,
        (Some(deadline), Some(done)) => done <= deadline,
        (Some(_), None) => false,
    }
}

fn zeroed_status_counts() -> BTreeMap<String, i64> {
    LifecycleStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect()
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: EngineStore,
    tracker: AssignmentTracker,
    days_threshold: i64,
}

impl StatsAggregator {
    pub fn new(store: EngineStore, tracker: AssignmentTracker, config: &EngineConfig) -> Self {
        Self {
            store,
            tracker,
            days_threshold: config.deadline_days_threshold,
        }
    }

    async fn snapshot(&self) -> Result<(Vec<Workflow>, Vec<WorkflowAssignment>), AppError> {
        let workflows = self
            .store
            .bounded(
                "list_workflows",
                self.store
                    .workflows()
                    .list_workflows(&WorkflowFilter::default(), Page::all()),
            )
            .await?;
        let assignments = self
            .store
            .bounded(
                "list_all_assignments",
                self.store.workflows().list_all_assignments(),
            )
            .await?;
        Ok((workflows, assignments))
    }

    /// Summarise a set of workflows as of `now`. Template names are looked up in `names`;
    /// workflows whose template is gone are grouped under an empty name.
    pub fn summarize(
        &self,
        workflows: &[Workflow],
        assignments: &[WorkflowAssignment],
        names: &HashMap<Uuid, String>,
        now: DateTime<Utc>,
    ) -> GeneralWorkflowStats {
        let mut stats = GeneralWorkflowStats {
            total_workflows: workflows.len() as i64,
            by_status: zeroed_status_counts(),
            by_priority: [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent]
                .iter()
                .map(|p| (p.as_str().to_string(), 0))
                .collect(),
            by_visibility: [Visibility::Public, Visibility::Restricted, Visibility::Team]
                .iter()
                .map(|v| (v.as_str().to_string(), 0))
                .collect(),
            ..GeneralWorkflowStats::default()
        };

        let mut teams: BTreeMap<Option<Uuid>, TeamWorkflowStats> = BTreeMap::new();
        let mut templates: BTreeMap<Uuid, TemplateWorkflowStats> = BTreeMap::new();
        let mut on_time = 0;

        for w in workflows {
            *stats
                .by_status
                .entry(w.lifecycle_status.as_str().to_string())
                .or_default() += 1;
            *stats.by_priority.entry(w.priority.as_str().to_string()).or_default() += 1;
            *stats
                .by_visibility
                .entry(w.visibility.as_str().to_string())
                .or_default() += 1;

            let state = deadline_state(w, self.days_threshold, now);
            let completed = w.lifecycle_status == LifecycleStatus::Completed;
            if state.is_overdue {
                stats.overdue_count += 1;
            } else if state.is_near_deadline {
                stats.near_deadline_count += 1;
            } else if w.lifecycle_status.is_open() {
                stats.on_track_count += 1;
            }
            if completed {
                stats.completed_count += 1;
                if completed_on_time(w) {
                    on_time += 1;
                }
            }

            let team = teams.entry(w.team_id).or_insert_with(|| TeamWorkflowStats {
                team_id: w.team_id,
                ..TeamWorkflowStats::default()
            });
            team.total += 1;
            team.completed += i64::from(completed);
            team.overdue += i64::from(state.is_overdue);

            let template = templates
                .entry(w.template_id)
                .or_insert_with(|| TemplateWorkflowStats {
                    template_id: w.template_id,
                    template_name: names.get(&w.template_id).cloned().unwrap_or_default(),
                    ..TemplateWorkflowStats::default()
                });
            template.total += 1;
            template.completed += i64::from(completed);
        }

        stats.completion_rate = ratio(stats.completed_count, stats.total_workflows);
        stats.on_time_completion_rate = ratio(on_time, stats.completed_count);
        stats.average_time_per_step_hours = average_hours(assignments.iter());
        stats.by_team = teams.into_values().collect();
        stats.by_template = templates.into_values().collect();
        stats
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_general_workflow_stats(&self) -> Result<GeneralWorkflowStats, AppError> {
        let (workflows, assignments) = self.snapshot().await?;
        let names: HashMap<Uuid, String> = self
            .store
            .bounded("list_templates", self.store.templates().list_templates())
            .await?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();

        let stats = self.summarize(&workflows, &assignments, &names, Utc::now());
        tracing::debug!(
            total = stats.total_workflows,
            completed = stats.completed_count,
            overdue = stats.overdue_count,
            "Computed workflow stats"
        );
        Ok(stats)
    }

    /// Stats over the workflows a user created or was ever assigned to.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_workflow_stats(&self, user_id: Uuid) -> Result<UserWorkflowStats, AppError> {
        let (workflows, assignments) = self.snapshot().await?;
        let now = Utc::now();
        let mine: Vec<&WorkflowAssignment> =
            assignments.iter().filter(|a| a.assigned_to == user_id).collect();
        let touched: HashSet<Uuid> = mine.iter().map(|a| a.workflow_id).collect();

        let mut by_workflow: HashMap<Uuid, Vec<WorkflowAssignment>> = HashMap::new();
        for a in &assignments {
            by_workflow.entry(a.workflow_id).or_default().push(a.clone());
        }

        let mut stats = UserWorkflowStats {
            user_id,
            by_status: zeroed_status_counts(),
            ..UserWorkflowStats::default()
        };
        for w in &workflows {
            let created = w.created_by == user_id;
            if created {
                stats.created_count += 1;
            }
            let holds_current = by_workflow
                .get(&w.id)
                .and_then(|rows| AssignmentTracker::active_for_step(rows, w.current_step))
                .is_some_and(|a| a.assigned_to == user_id);
            if holds_current {
                stats.assigned_count += 1;
            }
            if !created && !touched.contains(&w.id) {
                continue;
            }

            *stats
                .by_status
                .entry(w.lifecycle_status.as_str().to_string())
                .or_default() += 1;
            if w.lifecycle_status == LifecycleStatus::Completed {
                stats.completed_count += 1;
            }
            let state = deadline_state(w, self.days_threshold, now);
            stats.overdue_count += i64::from(state.is_overdue);
            stats.near_deadline_count += i64::from(state.is_near_deadline);
        }

        for a in &mine {
            match a.status {
                AssignmentStatus::Pending => stats.pending_assignments += 1,
                AssignmentStatus::InProgress => stats.in_progress_assignments += 1,
                AssignmentStatus::Completed => stats.completed_assignments += 1,
            }
        }
        stats.average_time_per_step_hours = average_hours(mine.into_iter());
        Ok(stats)
    }

    /// Every user holding at least one assignment, heaviest workload first.
    pub async fn get_users_workload(&self) -> Result<Vec<UserWorkload>, AppError> {
        self.tracker.get_users_workload().await
    }
}
