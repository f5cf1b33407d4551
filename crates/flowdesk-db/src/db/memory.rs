//! Process-local store implementing every repository trait.
//!
//! All state sits behind one `RwLock`, so each change set is applied under a single
//! write guard and is never observed half-written. Transitions are only ever pushed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use flowdesk_core::models::{
    LifecycleStatus, Page, Workflow, WorkflowAssignment, WorkflowFilter, WorkflowNotification,
    WorkflowStatusTemplate, WorkflowTemplate, WorkflowTransition,
};
use flowdesk_core::AppError;

use super::traits::{
    DeleteOutcome, NotificationRepositoryTrait, StatusTemplateRepositoryTrait,
    TemplateRepositoryTrait, WorkflowChangeSet, WorkflowRepositoryTrait,
};

#[derive(Default)]
struct MemoryState {
    templates: HashMap<Uuid, WorkflowTemplate>,
    status_templates: HashMap<Uuid, WorkflowStatusTemplate>,
    workflows: HashMap<Uuid, Workflow>,
    /// Insertion order doubles as creation order
    assignments: Vec<WorkflowAssignment>,
    transitions: Vec<WorkflowTransition>,
    notifications: Vec<WorkflowNotification>,
}

impl MemoryState {
    fn upsert_assignment(&mut self, assignment: &WorkflowAssignment) {
        match self.assignments.iter_mut().find(|a| a.id == assignment.id) {
            Some(existing) => *existing = assignment.clone(),
            None => self.assignments.push(assignment.clone()),
        }
    }

    fn check_single_active(&self, workflow_id: Uuid) -> Result<(), AppError> {
        let mut active_steps: Vec<i32> = self
            .assignments
            .iter()
            .filter(|a| a.workflow_id == workflow_id && a.is_active())
            .map(|a| a.step_number)
            .collect();
        let before = active_steps.len();
        active_steps.sort_unstable();
        active_steps.dedup();
        if active_steps.len() != before {
            return Err(AppError::Storage(format!(
                "More than one active assignment for a step of workflow {}",
                workflow_id
            )));
        }
        Ok(())
    }

    fn is_assigned(&self, workflow: &Workflow, user_id: Uuid) -> bool {
        self.assignments.iter().any(|a| {
            a.workflow_id == workflow.id
                && a.step_number == workflow.current_step
                && a.is_active()
                && a.assigned_to == user_id
        })
    }

    fn matching(&self, filter: &WorkflowFilter) -> Vec<&Workflow> {
        let mut rows: Vec<&Workflow> = self
            .workflows
            .values()
            .filter(|w| filter.matches_row(w))
            .filter(|w| match filter.assigned_to {
                Some(user_id) => self.is_assigned(w, user_id),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }

    fn write_change_set(&mut self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        let snapshot = self.assignments.clone();
        for assignment in &changes.assignments {
            self.upsert_assignment(assignment);
        }
        if let Err(e) = self.check_single_active(changes.workflow.id) {
            self.assignments = snapshot;
            return Err(e);
        }
        self.workflows
            .insert(changes.workflow.id, changes.workflow.clone());
        self.transitions.push(changes.transition.clone());
        self.notifications
            .extend(changes.notifications.iter().cloned());
        Ok(())
    }
}

/// In-memory store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transition row currently stored, in append order.
    pub async fn transition_count(&self) -> usize {
        self.state.read().await.transitions.len()
    }
}

#[async_trait]
impl TemplateRepositoryTrait for MemoryStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state.templates.contains_key(&template.id) {
            return Err(AppError::Conflict(format!(
                "Template {} already exists",
                template.id
            )));
        }
        state.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, AppError> {
        Ok(self.state.read().await.templates.get(&id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, AppError> {
        let state = self.state.read().await;
        let mut templates: Vec<WorkflowTemplate> = state.templates.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    async fn update_template(&self, template: &WorkflowTemplate) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.templates.get_mut(&template.id) {
            Some(existing) => {
                *existing = template.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_template_if_unused(&self, id: Uuid) -> Result<DeleteOutcome, AppError> {
        let mut state = self.state.write().await;
        if !state.templates.contains_key(&id) {
            return Ok(DeleteOutcome::NotFound);
        }
        let in_use = state
            .workflows
            .values()
            .any(|w| w.template_id == id && w.lifecycle_status != LifecycleStatus::Archived);
        if in_use {
            return Ok(DeleteOutcome::InUse);
        }
        state.templates.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl StatusTemplateRepositoryTrait for MemoryStore {
    async fn insert_status_template(
        &self,
        template: &WorkflowStatusTemplate,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state.status_templates.contains_key(&template.id) {
            return Err(AppError::Conflict(format!(
                "Status template {} already exists",
                template.id
            )));
        }
        state.status_templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_status_template(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowStatusTemplate>, AppError> {
        Ok(self.state.read().await.status_templates.get(&id).cloned())
    }

    async fn list_status_templates(&self) -> Result<Vec<WorkflowStatusTemplate>, AppError> {
        let state = self.state.read().await;
        let mut templates: Vec<WorkflowStatusTemplate> =
            state.status_templates.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    async fn delete_status_template_if_unused(
        &self,
        id: Uuid,
    ) -> Result<DeleteOutcome, AppError> {
        let mut state = self.state.write().await;
        if !state.status_templates.contains_key(&id) {
            return Ok(DeleteOutcome::NotFound);
        }
        let in_use = state.workflows.values().any(|w| {
            w.status_template_id == Some(id) && w.lifecycle_status != LifecycleStatus::Archived
        });
        if in_use {
            return Ok(DeleteOutcome::InUse);
        }
        state.status_templates.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl WorkflowRepositoryTrait for MemoryStore {
    async fn insert_workflow(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state.workflows.contains_key(&changes.workflow.id) {
            return Err(AppError::Conflict(format!(
                "Workflow {} already exists",
                changes.workflow.id
            )));
        }
        state.write_change_set(changes)
    }

    async fn apply_changes(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let current = state
            .workflows
            .get(&changes.workflow.id)
            .ok_or_else(|| AppError::not_found("Workflow", changes.workflow.id))?;
        if Some(current.updated_at) != changes.expected_updated_at {
            return Err(AppError::Conflict(format!(
                "Workflow {} was modified concurrently",
                changes.workflow.id
            )));
        }
        state.write_change_set(changes)
    }

    async fn update_workflow_details(
        &self,
        workflow: &Workflow,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let current = state
            .workflows
            .get_mut(&workflow.id)
            .ok_or_else(|| AppError::not_found("Workflow", workflow.id))?;
        if current.updated_at != expected_updated_at {
            return Err(AppError::Conflict(format!(
                "Workflow {} was modified concurrently",
                workflow.id
            )));
        }
        current.title = workflow.title.clone();
        current.description = workflow.description.clone();
        current.priority = workflow.priority;
        current.visibility = workflow.visibility;
        current.deadline = workflow.deadline;
        current.team_id = workflow.team_id;
        current.updated_at = workflow.updated_at;
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, AppError> {
        Ok(self.state.read().await.workflows.get(&id).cloned())
    }

    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
        page: Page,
    ) -> Result<Vec<Workflow>, AppError> {
        let state = self.state.read().await;
        let offset = usize::try_from(page.offset).unwrap_or(0);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        Ok(state
            .matching(filter)
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_workflows(&self, filter: &WorkflowFilter) -> Result<i64, AppError> {
        Ok(self.state.read().await.matching(filter).len() as i64)
    }

    async fn count_by_template(
        &self,
        template_id: Uuid,
        include_archived: bool,
    ) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .workflows
            .values()
            .filter(|w| w.template_id == template_id)
            .filter(|w| include_archived || w.lifecycle_status != LifecycleStatus::Archived)
            .count() as i64)
    }

    async fn list_assignments(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn list_assignments_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.assigned_to == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_assignments(&self) -> Result<Vec<WorkflowAssignment>, AppError> {
        Ok(self.state.read().await.assignments.clone())
    }

    async fn list_transitions(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowTransition>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .transitions
            .iter()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if state.workflows.remove(&id).is_none() {
            return Ok(false);
        }
        state.assignments.retain(|a| a.workflow_id != id);
        state.transitions.retain(|t| t.workflow_id != id);
        state.notifications.retain(|n| n.workflow_id != id);
        Ok(true)
    }
}

#[async_trait]
impl NotificationRepositoryTrait for MemoryStore {
    async fn insert_notification(
        &self,
        notification: &WorkflowNotification,
    ) -> Result<(), AppError> {
        self.state
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn list_notifications_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<WorkflowNotification>, AppError> {
        let state = self.state.read().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for n in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdesk_core::models::{
        AssignmentStatus, NotificationType, Priority, TransitionType, Visibility,
    };

    fn workflow(now: DateTime<Utc>) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            status_template_id: None,
            title: "Vendor onboarding".to_string(),
            description: None,
            priority: Priority::High,
            lifecycle_status: LifecycleStatus::InProgress,
            custom_status_id: None,
            visibility: Visibility::Public,
            deadline: None,
            team_id: None,
            created_by: Uuid::new_v4(),
            current_step: 1,
            total_steps: 2,
            progress_percentage: 0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn change_set(w: &Workflow, assignee: Uuid) -> WorkflowChangeSet {
        WorkflowChangeSet {
            workflow: w.clone(),
            expected_updated_at: None,
            assignments: vec![WorkflowAssignment {
                id: Uuid::new_v4(),
                workflow_id: w.id,
                step_number: 1,
                assigned_to: assignee,
                status: AssignmentStatus::Pending,
                start_date: w.created_at,
                completion_date: None,
            }],
            transition: WorkflowTransition {
                id: Uuid::new_v4(),
                workflow_id: w.id,
                from_step: None,
                to_step: Some(1),
                from_status: None,
                to_status: None,
                from_user_id: None,
                to_user_id: Some(assignee),
                comments: None,
                transition_type: TransitionType::Assignment,
                created_by: w.created_by,
                created_at: w.created_at,
            },
            notifications: vec![WorkflowNotification {
                id: Uuid::new_v4(),
                workflow_id: w.id,
                user_id: assignee,
                title: "New assignment".to_string(),
                message: "Step 1".to_string(),
                notification_type: NotificationType::Assignment,
                read: false,
                created_at: w.created_at,
            }],
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_side_effects() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let w = workflow(now);
        let assignee = Uuid::new_v4();
        store.insert_workflow(&change_set(&w, assignee)).await.unwrap();

        let mut changed = w.clone();
        changed.title = "Renamed".to_string();
        changed.updated_at = now + chrono::Duration::seconds(1);
        let mut stale = change_set(&changed, assignee);
        stale.assignments.clear();
        stale.expected_updated_at = Some(now - chrono::Duration::seconds(5));

        let err = store.apply_changes(&stale).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.transition_count().await, 1);
        let stored = store.get_workflow(w.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Vendor onboarding");
    }

    #[tokio::test]
    async fn second_active_assignment_for_step_rolls_back() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let w = workflow(now);
        let first = Uuid::new_v4();
        store.insert_workflow(&change_set(&w, first)).await.unwrap();

        let mut next = change_set(&w, Uuid::new_v4());
        next.expected_updated_at = Some(w.updated_at);
        let err = store.apply_changes(&next).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let assignments = store.list_assignments(w.id).await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].assigned_to, first);
        assert_eq!(store.transition_count().await, 1);
    }

    #[tokio::test]
    async fn mark_all_read_counts_only_unread() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let w = workflow(now);
        let assignee = Uuid::new_v4();
        store.insert_workflow(&change_set(&w, assignee)).await.unwrap();

        assert_eq!(store.mark_all_read(assignee).await.unwrap(), 1);
        assert_eq!(store.mark_all_read(assignee).await.unwrap(), 0);
        let unread = store
            .list_notifications_for_user(assignee, true, 10)
            .await
            .unwrap();
        assert!(unread.is_empty());
    }

    #[tokio::test]
    async fn delete_cascades() {
        let store = MemoryStore::new();
        let w = workflow(Utc::now());
        let assignee = Uuid::new_v4();
        store.insert_workflow(&change_set(&w, assignee)).await.unwrap();

        assert!(store.delete_workflow(w.id).await.unwrap());
        assert!(store.list_assignments(w.id).await.unwrap().is_empty());
        assert!(store.list_transitions(w.id).await.unwrap().is_empty());
        assert!(store
            .list_notifications_for_user(assignee, false, 10)
            .await
            .unwrap()
            .is_empty());
        assert!(!store.delete_workflow(w.id).await.unwrap());
    }
}
