//! Workflow engine: the instance store and its state machine.
//!
//! Every mutation follows the same shape:
//! 1. take the per-workflow lock
//! 2. load the workflow and its assignments
//! 3. check the actor may modify it
//! 4. build a [`WorkflowChangeSet`] (row, assignments, one transition, notifications)
//! 5. apply it conditionally on the `updated_at` read in step 2
//!
//! Lifecycle operations live in `lifecycle`, step operations in `steps`.

mod lifecycle;
mod steps;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use flowdesk_core::models::{
    CreateWorkflowRequest, LifecycleStatus, Page, TransitionType, UpdateWorkflowRequest,
    Workflow, WorkflowAssignment, WorkflowDetails, WorkflowFilter, WorkflowNotification,
    WorkflowPage, WorkflowStepView, WorkflowTransition,
};
use flowdesk_core::{deadline_state, AppError, EngineConfig};
use flowdesk_db::WorkflowChangeSet;
use flowdesk_infra::{KeyGuard, KeyedLocks};

use crate::assignments::AssignmentTracker;
use crate::catalog::{StatusCatalog, TemplateCatalog};
use crate::collaborators::{DirectoryService, Permission, TeamRegistry};
use crate::ledger::{TransitionBuilder, TransitionLedger};
use crate::notifications::NotificationDispatcher;
use crate::store::EngineStore;

/// Workflow row, assignments and lock held for one mutation
pub(crate) struct Loaded {
    pub workflow: Workflow,
    pub assignments: Vec<WorkflowAssignment>,
    _guard: KeyGuard,
}

/// Next `updated_at`: now at storage precision, strictly after the previous value.
pub(crate) fn next_version(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: EngineStore,
    templates: TemplateCatalog,
    statuses: StatusCatalog,
    assignments: AssignmentTracker,
    ledger: TransitionLedger,
    notifications: NotificationDispatcher,
    directory: Arc<dyn DirectoryService>,
    teams: Arc<dyn TeamRegistry>,
    locks: KeyedLocks,
    deadline_days_threshold: i64,
}

impl WorkflowEngine {
    pub fn new(
        store: EngineStore,
        directory: Arc<dyn DirectoryService>,
        teams: Arc<dyn TeamRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            templates: TemplateCatalog::new(store.clone(), directory.clone(), teams.clone()),
            statuses: StatusCatalog::new(store.clone()),
            assignments: AssignmentTracker::new(store.clone(), config.workload_threshold),
            ledger: TransitionLedger::new(store.clone()),
            notifications: NotificationDispatcher::new(store.clone()),
            store,
            directory,
            teams,
            locks: KeyedLocks::new(),
            deadline_days_threshold: config.deadline_days_threshold,
        }
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    pub fn statuses(&self) -> &StatusCatalog {
        &self.statuses
    }

    pub fn assignments(&self) -> &AssignmentTracker {
        &self.assignments
    }

    pub fn ledger(&self) -> &TransitionLedger {
        &self.ledger
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    async fn require_user(&self, user_id: Uuid) -> Result<(), AppError> {
        match self.directory.resolve_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("User", user_id)),
        }
    }

    async fn require_team(&self, team_id: Option<Uuid>) -> Result<(), AppError> {
        if let Some(team_id) = team_id {
            if !self.teams.team_exists(team_id).await? {
                return Err(AppError::not_found("Team", team_id));
            }
        }
        Ok(())
    }

    fn ensure_future_deadline(deadline: Option<DateTime<Utc>>) -> Result<(), AppError> {
        if let Some(deadline) = deadline {
            if deadline <= Utc::now() {
                return Err(AppError::Validation(format!(
                    "Deadline {} is in the past",
                    deadline.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    /// Current display name of a step; `None` once the template is gone.
    async fn step_name(
        &self,
        template_id: Uuid,
        step_number: i32,
    ) -> Result<Option<String>, AppError> {
        let template = self
            .store
            .bounded("get_template", self.store.templates().get_template(template_id))
            .await?;
        Ok(template.and_then(|t| t.step_name(step_number).map(str::to_string)))
    }

    async fn check_modify(
        &self,
        workflow: &Workflow,
        assignments: &[WorkflowAssignment],
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        if workflow.created_by == user_id {
            return Ok(true);
        }
        let assignee = AssignmentTracker::active_for_step(assignments, workflow.current_step)
            .map(|a| a.assigned_to);
        if assignee == Some(user_id) {
            return Ok(true);
        }
        self.directory
            .has_permission(user_id, Permission::ModifyAnyWorkflow)
            .await
    }

    /// Lock, load and authorise a workflow for mutation.
    pub(crate) async fn load_for_mutation(
        &self,
        workflow_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Loaded, AppError> {
        let guard = self.locks.lock(workflow_id).await;
        let workflow = self.store.require_workflow(workflow_id).await?;
        let assignments = self.store.list_assignments(workflow_id).await?;
        if !self.check_modify(&workflow, &assignments, actor_id).await? {
            tracing::warn!(
                workflow_id = %workflow_id,
                actor_id = %actor_id,
                "Actor may not modify workflow"
            );
            return Err(AppError::PermissionDenied(format!(
                "User {} may not modify workflow {}",
                actor_id, workflow_id
            )));
        }
        Ok(Loaded {
            workflow,
            assignments,
            _guard: guard,
        })
    }

    /// Apply a change set built from `before`, guarded by its `updated_at`.
    pub(crate) async fn commit(
        &self,
        before: &Workflow,
        workflow: Workflow,
        assignments: Vec<WorkflowAssignment>,
        transition: WorkflowTransition,
        notifications: Vec<WorkflowNotification>,
    ) -> Result<Workflow, AppError> {
        let changes = WorkflowChangeSet {
            workflow,
            expected_updated_at: Some(before.updated_at),
            assignments,
            transition,
            notifications,
        };
        self.store.apply_changes(&changes).await?;
        Ok(changes.workflow)
    }

    /// `true` for the creator, the active assignee of the current step, or a holder of
    /// `ModifyAnyWorkflow`.
    #[tracing::instrument(skip(self), fields(workflow_id = %workflow_id, user_id = %user_id))]
    pub async fn can_user_modify(&self, user_id: Uuid, workflow_id: Uuid) -> Result<bool, AppError> {
        let workflow = self.store.require_workflow(workflow_id).await?;
        let assignments = self.store.list_assignments(workflow_id).await?;
        self.check_modify(&workflow, &assignments, user_id).await
    }

    #[tracing::instrument(skip(self, request), fields(template_id = %request.template_id, creator_id = %creator_id))]
    pub async fn create_workflow(
        &self,
        request: CreateWorkflowRequest,
        creator_id: Uuid,
    ) -> Result<Workflow, AppError> {
        request.validate()?;
        Self::ensure_future_deadline(request.deadline)?;

        let template = self
            .templates
            .ensure_selectable(request.template_id, creator_id)
            .await?;
        if template.steps.is_empty() {
            return Err(AppError::Validation(format!(
                "Template {} has no steps",
                template.id
            )));
        }

        let custom_status_id = match request.status_template_id {
            Some(status_template_id) => {
                let status_template = self.statuses.get_status_template(status_template_id).await?;
                let initial = status_template.initial_item().ok_or_else(|| {
                    AppError::Validation(format!(
                        "Status template {} has no initial item",
                        status_template_id
                    ))
                })?;
                Some(initial.id)
            }
            None => None,
        };

        self.require_user(request.assign_to).await?;
        self.require_team(request.team_id).await?;

        let now = Utc::now().trunc_subsecs(6);
        let workflow = Workflow {
            id: Uuid::new_v4(),
            template_id: template.id,
            status_template_id: request.status_template_id,
            title: request.title.trim().to_string(),
            description: request.description,
            priority: request.priority,
            lifecycle_status: LifecycleStatus::InProgress,
            custom_status_id,
            visibility: request.visibility,
            deadline: request.deadline,
            team_id: request.team_id,
            created_by: creator_id,
            current_step: 1,
            total_steps: template.step_count(),
            progress_percentage: Workflow::progress_for_step(1, template.step_count()),
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let assignment = AssignmentTracker::open(workflow.id, 1, request.assign_to, now);
        let transition =
            TransitionBuilder::new(workflow.id, TransitionType::Assignment, creator_id, now)
                .steps(None, Some(1))
                .users(None, Some(request.assign_to))
                .build();
        let notice = NotificationDispatcher::assignment_notice(
            &workflow,
            1,
            template.step_name(1),
            request.assign_to,
            now,
        );

        let changes = WorkflowChangeSet {
            workflow,
            expected_updated_at: None,
            assignments: vec![assignment],
            transition,
            notifications: vec![notice],
        };
        self.store
            .bounded("insert_workflow", self.store.workflows().insert_workflow(&changes))
            .await?;

        tracing::info!(
            workflow_id = %changes.workflow.id,
            total_steps = changes.workflow.total_steps,
            assignee = %request.assign_to,
            "Workflow created"
        );
        Ok(changes.workflow)
    }

    pub async fn get_workflow(&self, workflow_id: Uuid) -> Result<Workflow, AppError> {
        self.store.require_workflow(workflow_id).await
    }

    /// Workflow plus deadline state, current step names and the custom status item.
    #[tracing::instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn get_workflow_details(&self, workflow_id: Uuid) -> Result<WorkflowDetails, AppError> {
        let workflow = self.store.require_workflow(workflow_id).await?;
        let assignments = self.store.list_assignments(workflow_id).await?;
        let template = self
            .store
            .bounded(
                "get_template",
                self.store.templates().get_template(workflow.template_id),
            )
            .await?;

        let custom_status = match (workflow.status_template_id, workflow.custom_status_id) {
            (Some(template_id), Some(item_id)) => self
                .store
                .bounded(
                    "get_status_template",
                    self.store.status_templates().get_status_template(template_id),
                )
                .await?
                .and_then(|t| t.item(item_id).cloned()),
            _ => None,
        };

        let steps = (1..=workflow.total_steps)
            .map(|step_number| WorkflowStepView {
                step_number,
                name: template
                    .as_ref()
                    .and_then(|t| t.step_name(step_number))
                    .map(str::to_string),
                active_assignment: AssignmentTracker::active_for_step(&assignments, step_number)
                    .cloned(),
            })
            .collect();

        let state = deadline_state(&workflow, self.deadline_days_threshold, Utc::now());
        Ok(WorkflowDetails {
            current_assignee: AssignmentTracker::active_for_step(
                &assignments,
                workflow.current_step,
            )
            .map(|a| a.assigned_to),
            template_name: template.map(|t| t.name),
            is_overdue: state.is_overdue,
            is_near_deadline: state.is_near_deadline,
            days_remaining: state.days_remaining,
            custom_status,
            steps,
            workflow,
        })
    }

    /// Newest first, with the unpaginated match count.
    #[tracing::instrument(skip(self, filter))]
    pub async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
        page: Page,
    ) -> Result<WorkflowPage, AppError> {
        let items = self
            .store
            .bounded(
                "list_workflows",
                self.store.workflows().list_workflows(filter, page),
            )
            .await?;
        let total = self
            .store
            .bounded("count_workflows", self.store.workflows().count_workflows(filter))
            .await?;
        tracing::debug!(returned = items.len(), total, "Listed workflows");
        Ok(WorkflowPage {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Metadata edit. Not a state change: no transition is recorded.
    #[tracing::instrument(skip(self, request), fields(workflow_id = %workflow_id, actor_id = %actor_id))]
    pub async fn update_workflow(
        &self,
        workflow_id: Uuid,
        request: UpdateWorkflowRequest,
        actor_id: Uuid,
    ) -> Result<Workflow, AppError> {
        request.validate()?;
        let loaded = self.load_for_mutation(workflow_id, actor_id).await?;
        let before = loaded.workflow;

        if before.lifecycle_status == LifecycleStatus::Archived {
            return Err(AppError::InvalidStateTransition(format!(
                "Workflow {} is archived; restore it before editing",
                workflow_id
            )));
        }

        let mut workflow = before.clone();
        if let Some(title) = request.title {
            workflow.title = title.trim().to_string();
        }
        if let Some(description) = request.description {
            workflow.description = description;
        }
        if let Some(priority) = request.priority {
            workflow.priority = priority;
        }
        if let Some(visibility) = request.visibility {
            workflow.visibility = visibility;
        }
        if let Some(deadline) = request.deadline {
            Self::ensure_future_deadline(deadline)?;
            workflow.deadline = deadline;
        }
        if let Some(team_id) = request.team_id {
            self.require_team(team_id).await?;
            workflow.team_id = team_id;
        }
        workflow.updated_at = next_version(before.updated_at);

        self.store
            .bounded(
                "update_workflow_details",
                self.store
                    .workflows()
                    .update_workflow_details(&workflow, before.updated_at),
            )
            .await?;

        tracing::info!("Workflow metadata updated");
        Ok(workflow)
    }

    /// Cascade delete. Only the creator or a holder of `ModifyAnyWorkflow` may delete.
    #[tracing::instrument(skip(self), fields(workflow_id = %workflow_id, actor_id = %actor_id))]
    pub async fn delete_workflow(&self, workflow_id: Uuid, actor_id: Uuid) -> Result<(), AppError> {
        let _guard = self.locks.lock(workflow_id).await;
        let workflow = self.store.require_workflow(workflow_id).await?;
        let allowed = workflow.created_by == actor_id
            || self
                .directory
                .has_permission(actor_id, Permission::ModifyAnyWorkflow)
                .await?;
        if !allowed {
            return Err(AppError::PermissionDenied(format!(
                "User {} may not delete workflow {}",
                actor_id, workflow_id
            )));
        }

        let deleted = self
            .store
            .bounded("delete_workflow", self.store.workflows().delete_workflow(workflow_id))
            .await?;
        if !deleted {
            return Err(AppError::not_found("Workflow", workflow_id));
        }
        tracing::info!("Workflow deleted");
        Ok(())
    }

    /// Transition ledger of one workflow, oldest first.
    pub async fn get_workflow_history(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowTransition>, AppError> {
        self.store.require_workflow(workflow_id).await?;
        self.ledger.history(workflow_id).await
    }
}
