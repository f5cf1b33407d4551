//! Step operations: sequential advance and ad-hoc assign/start/complete

use uuid::Uuid;

use flowdesk_core::models::{
    AssignmentStatus, LifecycleStatus, TransitionType, Workflow, WorkflowAssignment,
};
use flowdesk_core::AppError;

use super::{next_version, Loaded, WorkflowEngine};
use crate::assignments::AssignmentTracker;
use crate::ledger::TransitionBuilder;
use crate::notifications::NotificationDispatcher;

impl WorkflowEngine {
    /// Ad-hoc operations are allowed on running or paused workflows, for steps that exist.
    fn ensure_step_editable(workflow: &Workflow, step_number: i32) -> Result<(), AppError> {
        if !matches!(
            workflow.lifecycle_status,
            LifecycleStatus::InProgress | LifecycleStatus::Paused
        ) {
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} is {}; steps can only change while in progress or paused",
                workflow.id, workflow.lifecycle_status
            )));
        }
        if !workflow.has_step(step_number) {
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} has no step {} (total {})",
                workflow.id, step_number, workflow.total_steps
            )));
        }
        Ok(())
    }

    fn require_active<'a>(
        loaded: &'a Loaded,
        step_number: i32,
    ) -> Result<&'a WorkflowAssignment, AppError> {
        AssignmentTracker::active_for_step(&loaded.assignments, step_number).ok_or_else(|| {
            AppError::InvalidStateTransition(format!(
                "Step {} of workflow {} has no active assignment",
                step_number, loaded.workflow.id
            ))
        })
    }

    /// Complete the current step and hand the next one to `assign_to`.
    ///
    /// On the last step this completes the workflow instead; `assign_to` is then ignored.
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id, actor_id = %actor_id))]
    pub async fn advance_to_next_step(
        &self,
        workflow_id: Uuid,
        assign_to: Option<Uuid>,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        let before = &loaded.workflow;

        if before.lifecycle_status != LifecycleStatus::InProgress {
            tracing::warn!(
                status = %before.lifecycle_status,
                "Rejected advance of a workflow that is not in progress"
            );
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} is {}; only in-progress workflows can advance",
                workflow_id, before.lifecycle_status
            )));
        }

        if before.is_last_step() {
            return self.complete_final_step(&loaded, actor_id, comments).await;
        }

        let assign_to = assign_to.ok_or_else(|| {
            AppError::Validation("An assignee is required to advance to the next step".to_string())
        })?;
        self.require_user(assign_to).await?;

        let mut workflow = before.clone();
        workflow.updated_at = next_version(before.updated_at);
        let at = workflow.updated_at;
        let from_step = before.current_step;
        let to_step = from_step + 1;

        let mut rows = Vec::with_capacity(3);
        let previous_assignee =
            AssignmentTracker::active_for_step(&loaded.assignments, from_step).map(|active| {
                rows.push(AssignmentTracker::close(active, at));
                active.assigned_to
            });
        rows.extend(
            AssignmentTracker::reassign(&loaded.assignments, workflow.id, to_step, assign_to, at)
                .into_rows(),
        );

        workflow.current_step = to_step;
        workflow.progress_percentage = Workflow::progress_for_step(to_step, workflow.total_steps);

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::StepChange, actor_id, at)
                .steps(Some(from_step), Some(to_step))
                .users(previous_assignee, Some(assign_to))
                .comments(comments)
                .build();
        let step_name = self.step_name(workflow.template_id, to_step).await?;
        let notice = NotificationDispatcher::assignment_notice(
            &workflow,
            to_step,
            step_name.as_deref(),
            assign_to,
            at,
        );

        let workflow = self
            .commit(before, workflow, rows, transition, vec![notice])
            .await?;
        tracing::info!(
            from_step,
            to_step,
            assignee = %assign_to,
            progress = workflow.progress_percentage,
            "Workflow advanced"
        );
        Ok(workflow)
    }

    async fn complete_final_step(
        &self,
        loaded: &Loaded,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let before = &loaded.workflow;
        let mut workflow = before.clone();
        workflow.lifecycle_status = LifecycleStatus::Completed;
        workflow.progress_percentage = 100;
        workflow.updated_at = next_version(before.updated_at);
        workflow.completed_at = Some(workflow.updated_at);
        let at = workflow.updated_at;
        let step = before.current_step;

        let active = AssignmentTracker::active_for_step(&loaded.assignments, step);
        let rows: Vec<WorkflowAssignment> = active
            .map(|a| AssignmentTracker::close(a, at))
            .into_iter()
            .collect();

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::StatusChange, actor_id, at)
                .steps(Some(step), Some(step))
                .statuses(
                    Some(LifecycleStatus::InProgress.as_str()),
                    Some(LifecycleStatus::Completed.as_str()),
                )
                .users(active.map(|a| a.assigned_to), None)
                .comments(comments)
                .build();

        let mut recipients = vec![workflow.created_by];
        recipients.extend(active.map(|a| a.assigned_to));
        let notices = NotificationDispatcher::status_change_notices(
            &workflow,
            LifecycleStatus::InProgress.as_str(),
            LifecycleStatus::Completed.as_str(),
            &recipients,
            at,
        );

        let workflow = self
            .commit(before, workflow, rows, transition, notices)
            .await?;
        tracing::info!(step, "Workflow completed on its final step");
        Ok(workflow)
    }

    /// Give `step_number` to `assign_to`, superseding any active assignment of that step.
    /// `current_step` does not move.
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id, assign_to = %assign_to))]
    pub async fn assign_step(
        &self,
        workflow_id: Uuid,
        step_number: i32,
        assign_to: Uuid,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        let before = &loaded.workflow;
        Self::ensure_step_editable(before, step_number)?;
        self.require_user(assign_to).await?;

        let mut workflow = before.clone();
        workflow.updated_at = next_version(before.updated_at);
        let at = workflow.updated_at;

        let plan = AssignmentTracker::reassign(
            &loaded.assignments,
            workflow.id,
            step_number,
            assign_to,
            at,
        );
        let previous = plan.previous_assignee();

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::Assignment, actor_id, at)
                .steps(Some(step_number), Some(step_number))
                .users(previous, Some(assign_to))
                .comments(comments)
                .build();
        let step_name = self.step_name(workflow.template_id, step_number).await?;
        let notice = NotificationDispatcher::assignment_notice(
            &workflow,
            step_number,
            step_name.as_deref(),
            assign_to,
            at,
        );

        let workflow = self
            .commit(before, workflow, plan.into_rows(), transition, vec![notice])
            .await?;
        tracing::info!(previous = ?previous, "Step assigned");
        Ok(workflow)
    }

    /// Move the active assignment of a step from `pending` to `in_progress`.
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id))]
    pub async fn start_step(
        &self,
        workflow_id: Uuid,
        step_number: i32,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        let before = &loaded.workflow;
        Self::ensure_step_editable(before, step_number)?;
        let active = Self::require_active(&loaded, step_number)?;
        if active.status != AssignmentStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "Step {} of workflow {} is already {}",
                step_number, workflow_id, active.status
            )));
        }

        let mut workflow = before.clone();
        workflow.updated_at = next_version(before.updated_at);
        let at = workflow.updated_at;

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::StatusChange, actor_id, at)
                .steps(Some(step_number), Some(step_number))
                .statuses(
                    Some(AssignmentStatus::Pending.as_str()),
                    Some(AssignmentStatus::InProgress.as_str()),
                )
                .comments(comments)
                .build();
        let notices = NotificationDispatcher::status_change_notices(
            &workflow,
            &format!("step {} pending", step_number),
            &format!("step {} in progress", step_number),
            &[workflow.created_by],
            at,
        );

        let rows = vec![AssignmentTracker::start(active)];
        let workflow = self
            .commit(before, workflow, rows, transition, notices)
            .await?;
        tracing::info!("Step started");
        Ok(workflow)
    }

    /// Mark the active assignment of a step completed. Audit only: neither
    /// `current_step` nor progress changes.
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id))]
    pub async fn complete_step(
        &self,
        workflow_id: Uuid,
        step_number: i32,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        let before = &loaded.workflow;
        Self::ensure_step_editable(before, step_number)?;
        let active = Self::require_active(&loaded, step_number)?;

        let mut workflow = before.clone();
        workflow.updated_at = next_version(before.updated_at);
        let at = workflow.updated_at;

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::StatusChange, actor_id, at)
                .steps(Some(step_number), Some(step_number))
                .statuses(
                    Some(active.status.as_str()),
                    Some(AssignmentStatus::Completed.as_str()),
                )
                .users(Some(active.assigned_to), None)
                .comments(comments)
                .build();
        let notices = NotificationDispatcher::status_change_notices(
            &workflow,
            &format!("step {} {}", step_number, active.status),
            &format!("step {} completed", step_number),
            &[workflow.created_by],
            at,
        );

        let rows = vec![AssignmentTracker::close(active, at)];
        let workflow = self
            .commit(before, workflow, rows, transition, notices)
            .await?;
        tracing::info!(assignee = %active.assigned_to, "Step completed");
        Ok(workflow)
    }
}
