//! Lifecycle and custom status transitions

use uuid::Uuid;

use flowdesk_core::models::{LifecycleStatus, TransitionType, Workflow};
use flowdesk_core::AppError;

use super::{next_version, Loaded, WorkflowEngine};
use crate::assignments::AssignmentTracker;
use crate::ledger::TransitionBuilder;
use crate::notifications::NotificationDispatcher;

impl WorkflowEngine {
    /// Move the lifecycle status along one edge of the lifecycle table.
    ///
    /// Entering `completed` pins progress at 100; leaving `archived` recomputes it from
    /// the current step. Edges into or out of `archived` notify nobody.
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id, target = %target))]
    pub async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        target: LifecycleStatus,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        self.transition_lifecycle(loaded, target, actor_id, comments)
            .await
    }

    /// `completed`/`canceled` to `archived`
    pub async fn archive_workflow(
        &self,
        workflow_id: Uuid,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        self.update_workflow_status(workflow_id, LifecycleStatus::Archived, actor_id, comments)
            .await
    }

    /// `archived` back to `in_progress` at the step it was archived on
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id))]
    pub async fn restore_workflow(
        &self,
        workflow_id: Uuid,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        if loaded.workflow.lifecycle_status != LifecycleStatus::Archived {
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} is {}, only archived workflows can be restored",
                workflow_id, loaded.workflow.lifecycle_status
            )));
        }
        self.transition_lifecycle(loaded, LifecycleStatus::InProgress, actor_id, comments)
            .await
    }

    async fn transition_lifecycle(
        &self,
        loaded: Loaded,
        target: LifecycleStatus,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let before = &loaded.workflow;
        let from = before.lifecycle_status;
        if !from.can_transition_to(target) {
            tracing::warn!(
                workflow_id = %before.id,
                from = %from,
                to = %target,
                "Rejected lifecycle transition"
            );
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} cannot move from {} to {}",
                before.id, from, target
            )));
        }

        let mut workflow = before.clone();
        workflow.lifecycle_status = target;
        workflow.updated_at = next_version(before.updated_at);
        if target == LifecycleStatus::Completed {
            workflow.progress_percentage = 100;
            workflow.completed_at = Some(workflow.updated_at);
        } else if from == LifecycleStatus::Archived {
            workflow.progress_percentage =
                Workflow::progress_for_step(workflow.current_step, workflow.total_steps);
            workflow.completed_at = None;
        }
        let at = workflow.updated_at;

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::StatusChange, actor_id, at)
                .statuses(Some(from.as_str()), Some(target.as_str()))
                .comments(comments)
                .build();

        let notifications = if LifecycleStatus::is_silent_edge(from, target) {
            Vec::new()
        } else {
            let mut recipients = Vec::with_capacity(2);
            if let Some(active) =
                AssignmentTracker::active_for_step(&loaded.assignments, workflow.current_step)
            {
                recipients.push(active.assigned_to);
            }
            recipients.push(workflow.created_by);
            NotificationDispatcher::status_change_notices(
                &workflow,
                from.as_str(),
                target.as_str(),
                &recipients,
                at,
            )
        };

        let workflow = self
            .commit(before, workflow, Vec::new(), transition, notifications)
            .await?;
        tracing::info!(
            workflow_id = %workflow.id,
            from = %from,
            to = %target,
            "Workflow lifecycle status changed"
        );
        Ok(workflow)
    }

    /// Switch to any item of the attached status template; there is no ordering between items.
    #[tracing::instrument(skip(self, comments), fields(workflow_id = %workflow_id, status_item_id = %status_item_id))]
    pub async fn update_workflow_custom_status(
        &self,
        workflow_id: Uuid,
        status_item_id: Uuid,
        actor_id: Uuid,
        comments: Option<String>,
    ) -> Result<Workflow, AppError> {
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        let before = &loaded.workflow;

        if before.lifecycle_status == LifecycleStatus::Archived {
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} is archived; its custom status is frozen",
                workflow_id
            )));
        }
        let status_template_id = before.status_template_id.ok_or_else(|| {
            AppError::Validation(format!(
                "Workflow {} has no status template attached",
                workflow_id
            ))
        })?;

        let (status_template, item) = self
            .statuses()
            .resolve_item(status_template_id, status_item_id)
            .await?;
        let from_name = before
            .custom_status_id
            .and_then(|id| status_template.item(id))
            .map(|i| i.name.clone());

        let mut workflow = before.clone();
        workflow.custom_status_id = Some(item.id);
        workflow.updated_at = next_version(before.updated_at);
        let at = workflow.updated_at;

        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::StatusChange, actor_id, at)
                .statuses(from_name.as_deref(), Some(item.name.as_str()))
                .comments(comments)
                .build();

        let mut recipients = Vec::with_capacity(2);
        if let Some(active) =
            AssignmentTracker::active_for_step(&loaded.assignments, workflow.current_step)
        {
            recipients.push(active.assigned_to);
        }
        recipients.push(workflow.created_by);
        let notifications = NotificationDispatcher::status_change_notices(
            &workflow,
            from_name.as_deref().unwrap_or("no status"),
            &item.name,
            &recipients,
            at,
        );

        let workflow = self
            .commit(before, workflow, Vec::new(), transition, notifications)
            .await?;
        tracing::info!(
            workflow_id = %workflow.id,
            status = %item.name,
            "Workflow custom status changed"
        );
        Ok(workflow)
    }
}
