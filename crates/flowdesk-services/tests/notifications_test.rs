//! Notification inbox and the periodic deadline scan.
//!
//! Run with: `cargo test -p flowdesk-services --test notifications_test`

mod helpers;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use flowdesk_core::models::{
    LifecycleStatus, NotificationType, Page, Workflow, WorkflowAssignment, WorkflowFilter,
    WorkflowTransition,
};
use flowdesk_core::{AppError, EngineConfig};
use flowdesk_db::{MemoryStore, WorkflowChangeSet, WorkflowRepositoryTrait};
use flowdesk_services::{DeadlineMonitor, EngineStore, NotificationDispatcher};
use helpers::{setup_engine, TestEngine};

/// Workflow repository whose assignment reads fail for one workflow.
struct BrokenAssignments {
    inner: MemoryStore,
    broken: Uuid,
}

#[async_trait::async_trait]
impl WorkflowRepositoryTrait for BrokenAssignments {
    async fn insert_workflow(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        self.inner.insert_workflow(changes).await
    }

    async fn apply_changes(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        self.inner.apply_changes(changes).await
    }

    async fn update_workflow_details(
        &self,
        workflow: &Workflow,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner
            .update_workflow_details(workflow, expected_updated_at)
            .await
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, AppError> {
        self.inner.get_workflow(id).await
    }

    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
        page: Page,
    ) -> Result<Vec<Workflow>, AppError> {
        self.inner.list_workflows(filter, page).await
    }

    async fn count_workflows(&self, filter: &WorkflowFilter) -> Result<i64, AppError> {
        self.inner.count_workflows(filter).await
    }

    async fn count_by_template(
        &self,
        template_id: Uuid,
        include_archived: bool,
    ) -> Result<i64, AppError> {
        self.inner.count_by_template(template_id, include_archived).await
    }

    async fn list_assignments(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        if workflow_id == self.broken {
            return Err(AppError::Storage("connection reset".to_string()));
        }
        self.inner.list_assignments(workflow_id).await
    }

    async fn list_assignments_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        self.inner.list_assignments_for_user(user_id).await
    }

    async fn list_all_assignments(&self) -> Result<Vec<WorkflowAssignment>, AppError> {
        self.inner.list_all_assignments().await
    }

    async fn list_transitions(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowTransition>, AppError> {
        self.inner.list_transitions(workflow_id).await
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_workflow(id).await
    }
}

async fn deadline_notices(t: &TestEngine, user: Uuid) -> usize {
    t.engine()
        .notifications()
        .get_user_notifications(user, false, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.notification_type == NotificationType::Deadline)
        .count()
}

#[tokio::test]
async fn test_inbox_read_flags() {
    let t = setup_engine().await;
    let dispatcher = t.engine().notifications();
    let first = t.create_workflow().await;
    t.create_workflow().await;
    dispatcher
        .notify(first.id, t.alice, "Reminder", "Please check the quote", NotificationType::Deadline)
        .await
        .unwrap();

    let inbox = dispatcher
        .get_user_notifications(t.alice, false, None)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 3);
    assert_eq!(inbox[0].title, "Reminder");

    dispatcher.mark_read(inbox[0].id).await.unwrap();
    dispatcher.mark_read(inbox[0].id).await.unwrap();
    let unread = dispatcher
        .get_user_notifications(t.alice, true, None)
        .await
        .unwrap();
    assert_eq!(unread.len(), 2);
    assert!(unread.iter().all(|n| !n.read));

    let limited = dispatcher
        .get_user_notifications(t.alice, false, Some(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    assert_eq!(dispatcher.mark_all_read(t.alice).await.unwrap(), 2);
    assert_eq!(dispatcher.mark_all_read(t.alice).await.unwrap(), 0);
    assert!(dispatcher
        .get_user_notifications(t.alice, true, None)
        .await
        .unwrap()
        .is_empty());

    let err = dispatcher.mark_read(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Other users' inboxes are untouched
    assert!(dispatcher
        .get_user_notifications(t.bob, false, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_deadline_scan_notifies_current_assignees() {
    let t = setup_engine().await;
    t.create_workflow().await;

    let mut far_request = t.request(t.bob);
    far_request.deadline = Some(Utc::now() + Duration::days(10));
    t.engine().create_workflow(far_request, t.creator).await.unwrap();

    let overdue = t.create_workflow().await;
    t.force_deadline(overdue.id, Some(Utc::now() - Duration::hours(2)))
        .await;

    let mut canceled_request = t.request(t.carol);
    canceled_request.deadline = Some(Utc::now() + Duration::hours(2));
    let canceled = t
        .engine()
        .create_workflow(canceled_request, t.creator)
        .await
        .unwrap();
    t.engine()
        .update_workflow_status(canceled.id, LifecycleStatus::Canceled, t.creator, None)
        .await
        .unwrap();

    let monitor = t.services.deadlines.clone();
    let report = monitor
        .check_and_send_deadline_notifications(3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.notified, 1);
    assert!(!report.cancelled);

    assert_eq!(deadline_notices(&t, t.alice).await, 1);
    assert_eq!(deadline_notices(&t, t.bob).await, 0);
    assert_eq!(deadline_notices(&t, t.carol).await, 0);

    // A wider window picks up the far workflow; repeated scans notify again
    let report = monitor
        .check_and_send_deadline_notifications(30, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.notified, 2);
    assert_eq!(deadline_notices(&t, t.alice).await, 2);
    assert_eq!(deadline_notices(&t, t.bob).await, 1);
}

#[tokio::test]
async fn test_deadline_scan_follows_reassignment() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;
    t.engine()
        .advance_to_next_step(workflow.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();

    let report = t
        .services
        .deadlines
        .check_and_send_deadline_notifications(3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.notified, 1);

    let bob_inbox = t
        .engine()
        .notifications()
        .get_user_notifications(t.bob, false, None)
        .await
        .unwrap();
    assert_eq!(bob_inbox[0].notification_type, NotificationType::Deadline);
}

#[tokio::test]
async fn test_cancelled_scan_dispatches_nothing() {
    let t = setup_engine().await;
    t.create_workflow().await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = t
        .services
        .deadlines
        .check_and_send_deadline_notifications(3, &cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.examined, 0);
    assert_eq!(report.notified, 0);
}

#[tokio::test]
async fn test_scan_skips_workflow_whose_assignments_fail_to_load() {
    let t = setup_engine().await;
    let broken = t.create_workflow().await;
    let mut healthy_request = t.request(t.bob);
    healthy_request.deadline = Some(Utc::now() + Duration::hours(2));
    t.engine()
        .create_workflow(healthy_request, t.creator)
        .await
        .unwrap();

    let memory = t.memory.clone();
    let store = EngineStore::new(
        Arc::new(memory.clone()),
        Arc::new(memory.clone()),
        Arc::new(BrokenAssignments {
            inner: memory.clone(),
            broken: broken.id,
        }),
        Arc::new(memory),
        std::time::Duration::from_secs(1),
    );
    let monitor = DeadlineMonitor::new(
        store.clone(),
        NotificationDispatcher::new(store),
        &EngineConfig::default(),
    );

    let report = monitor
        .check_and_send_deadline_notifications(3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(deadline_notices(&t, t.alice).await, 0);
    assert_eq!(deadline_notices(&t, t.bob).await, 1);
}
