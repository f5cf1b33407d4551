//! Assignment tracking: the single-active-assignment rule per step and per-user workload.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use flowdesk_core::models::{AssignmentStatus, Page, UserWorkload, Workflow, WorkflowAssignment, WorkflowFilter};
use flowdesk_core::{is_overdue, AppError};

use crate::store::EngineStore;

/// Assignment rows a reassignment writes: the superseded row (if any) and the new one.
#[derive(Debug, Clone)]
pub struct Reassignment {
    pub superseded: Option<WorkflowAssignment>,
    pub created: WorkflowAssignment,
}

impl Reassignment {
    pub fn previous_assignee(&self) -> Option<Uuid> {
        self.superseded.as_ref().map(|a| a.assigned_to)
    }

    /// Rows in the order they must be written (close before open).
    pub fn into_rows(self) -> Vec<WorkflowAssignment> {
        self.superseded.into_iter().chain(Some(self.created)).collect()
    }
}

#[derive(Clone)]
pub struct AssignmentTracker {
    store: EngineStore,
    threshold: u32,
}

impl AssignmentTracker {
    pub fn new(store: EngineStore, threshold: u32) -> Self {
        Self {
            store,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn active_for_step(
        assignments: &[WorkflowAssignment],
        step_number: i32,
    ) -> Option<&WorkflowAssignment> {
        assignments
            .iter()
            .find(|a| a.step_number == step_number && a.is_active())
    }

    pub fn open(
        workflow_id: Uuid,
        step_number: i32,
        assigned_to: Uuid,
        at: DateTime<Utc>,
    ) -> WorkflowAssignment {
        WorkflowAssignment {
            id: Uuid::new_v4(),
            workflow_id,
            step_number,
            assigned_to,
            status: AssignmentStatus::Pending,
            start_date: at,
            completion_date: None,
        }
    }

    pub fn close(assignment: &WorkflowAssignment, at: DateTime<Utc>) -> WorkflowAssignment {
        WorkflowAssignment {
            status: AssignmentStatus::Completed,
            completion_date: Some(at),
            ..assignment.clone()
        }
    }

    pub fn start(assignment: &WorkflowAssignment) -> WorkflowAssignment {
        WorkflowAssignment {
            status: AssignmentStatus::InProgress,
            ..assignment.clone()
        }
    }

    /// Close the active row of `step_number` (if any) and open a new one for `assigned_to`.
    pub fn reassign(
        assignments: &[WorkflowAssignment],
        workflow_id: Uuid,
        step_number: i32,
        assigned_to: Uuid,
        at: DateTime<Utc>,
    ) -> Reassignment {
        Reassignment {
            superseded: Self::active_for_step(assignments, step_number)
                .map(|active| Self::close(active, at)),
            created: Self::open(workflow_id, step_number, assigned_to, at),
        }
    }

    /// Workload of one user given their assignment rows and the workflows they belong to.
    /// Assignments on completed, canceled or archived workflows are not active work.
    pub fn workload_from(
        &self,
        user_id: Uuid,
        assignments: &[WorkflowAssignment],
        workflows: &HashMap<Uuid, Workflow>,
        now: DateTime<Utc>,
    ) -> UserWorkload {
        let mut pending = 0;
        let mut in_progress = 0;
        let mut overdue = 0;
        let mut total = 0;

        for a in assignments.iter().filter(|a| a.assigned_to == user_id) {
            total += 1;
            let Some(workflow) = workflows.get(&a.workflow_id) else {
                continue;
            };
            if !a.is_active() || !workflow.lifecycle_status.is_open() {
                continue;
            }
            match a.status {
                AssignmentStatus::Pending => pending += 1,
                AssignmentStatus::InProgress => in_progress += 1,
                AssignmentStatus::Completed => {}
            }
            if is_overdue(workflow, now) {
                overdue += 1;
            }
        }

        let active = pending + in_progress;
        let workload_percentage = active as f64 / f64::from(self.threshold) * 100.0;
        UserWorkload {
            user_id,
            active,
            pending,
            in_progress,
            overdue,
            total,
            workload_percentage,
            overloaded: workload_percentage > 100.0,
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_workload(&self, user_id: Uuid) -> Result<UserWorkload, AppError> {
        let assignments = self
            .store
            .bounded(
                "list_assignments_for_user",
                self.store.workflows().list_assignments_for_user(user_id),
            )
            .await?;

        let mut workflows = HashMap::new();
        for a in &assignments {
            if workflows.contains_key(&a.workflow_id) {
                continue;
            }
            if let Some(w) = self
                .store
                .bounded("get_workflow", self.store.workflows().get_workflow(a.workflow_id))
                .await?
            {
                workflows.insert(w.id, w);
            }
        }

        let workload = self.workload_from(user_id, &assignments, &workflows, Utc::now());
        tracing::debug!(
            active = workload.active,
            percentage = workload.workload_percentage,
            "Computed user workload"
        );
        Ok(workload)
    }

    /// Workload of every user holding at least one assignment, heaviest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_users_workload(&self) -> Result<Vec<UserWorkload>, AppError> {
        let assignments = self
            .store
            .bounded(
                "list_all_assignments",
                self.store.workflows().list_all_assignments(),
            )
            .await?;
        let workflows: HashMap<Uuid, Workflow> = self
            .store
            .bounded(
                "list_workflows",
                self.store
                    .workflows()
                    .list_workflows(&WorkflowFilter::default(), Page::all()),
            )
            .await?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        let mut users: Vec<Uuid> = assignments.iter().map(|a| a.assigned_to).collect();
        users.sort_unstable();
        users.dedup();

        let now = Utc::now();
        let mut workloads: Vec<UserWorkload> = users
            .into_iter()
            .map(|user_id| self.workload_from(user_id, &assignments, &workflows, now))
            .collect();
        workloads.sort_by(|a, b| {
            b.workload_percentage
                .total_cmp(&a.workload_percentage)
                .then(b.total.cmp(&a.total))
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(workloads)
    }
}
