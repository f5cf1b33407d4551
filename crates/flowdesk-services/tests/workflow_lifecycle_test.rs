//! Workflow creation, sequential advancement and lifecycle transitions.
//!
//! Run with: `cargo test -p flowdesk-services --test workflow_lifecycle_test`

mod helpers;

use chrono::{Duration, Utc};
use uuid::Uuid;

use flowdesk_core::models::{
    LifecycleStatus, NotificationType, Page, TransitionType, UpdateWorkflowRequest,
    WorkflowFilter,
};
use flowdesk_core::AppError;
use helpers::{setup_engine, TestEngine};

async fn inbox_sizes(t: &TestEngine, users: &[Uuid]) -> Vec<usize> {
    let mut sizes = Vec::with_capacity(users.len());
    for user in users {
        let inbox = t
            .engine()
            .notifications()
            .get_user_notifications(*user, false, Some(100))
            .await
            .unwrap();
        sizes.push(inbox.len());
    }
    sizes
}

#[tokio::test]
async fn test_create_workflow_starts_at_step_one() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;

    let details = t.engine().get_workflow_details(workflow.id).await.unwrap();
    assert_eq!(details.workflow.current_step, 1);
    assert_eq!(details.workflow.total_steps, 3);
    assert_eq!(details.workflow.progress_percentage, 0);
    assert_eq!(details.workflow.lifecycle_status, LifecycleStatus::InProgress);
    assert!(!details.is_overdue);
    assert!(details.is_near_deadline);
    assert_eq!(details.days_remaining, Some(1));
    assert_eq!(details.current_assignee, Some(t.alice));
    assert_eq!(details.template_name.as_deref(), Some("Purchase approval"));
    assert_eq!(details.steps.len(), 3);
    assert_eq!(details.steps[0].name.as_deref(), Some("Draft"));

    let history = t.engine().get_workflow_history(workflow.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transition_type, TransitionType::Assignment);
    assert_eq!(history[0].to_step, Some(1));
    assert_eq!(history[0].to_user_id, Some(t.alice));

    let inbox = t
        .engine()
        .notifications()
        .get_user_notifications(t.alice, false, None)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, NotificationType::Assignment);
}

#[tokio::test]
async fn test_create_workflow_rejects_bad_input() {
    let t = setup_engine().await;

    let mut past = t.request(t.alice);
    past.deadline = Some(Utc::now() - Duration::minutes(5));
    let err = t.engine().create_workflow(past, t.creator).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut missing_template = t.request(t.alice);
    missing_template.template_id = Uuid::new_v4();
    let err = t
        .engine()
        .create_workflow(missing_template, t.creator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let unknown_assignee = t.request(Uuid::new_v4());
    let err = t
        .engine()
        .create_workflow(unknown_assignee, t.creator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let mut missing_status = t.request(t.alice);
    missing_status.status_template_id = Some(Uuid::new_v4());
    let err = t
        .engine()
        .create_workflow(missing_status, t.creator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let mut blank_title = t.request(t.alice);
    blank_title.title = String::new();
    let err = t
        .engine()
        .create_workflow(blank_title, t.creator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut spaces_only = t.request(t.alice);
    spaces_only.title = "   ".to_string();
    let err = t
        .engine()
        .create_workflow(spaces_only, t.creator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(t.memory.transition_count().await, 0);
}

#[tokio::test]
async fn test_advance_through_every_step_then_complete() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;

    let step2 = t
        .engine()
        .advance_to_next_step(workflow.id, Some(t.bob), t.alice, Some("Drafted".into()))
        .await
        .unwrap();
    assert_eq!(step2.current_step, 2);
    assert_eq!(step2.progress_percentage, 33);

    let step3 = t
        .engine()
        .advance_to_next_step(workflow.id, Some(t.carol), t.bob, None)
        .await
        .unwrap();
    assert_eq!(step3.current_step, 3);
    assert_eq!(step3.progress_percentage, 66);

    let done = t
        .engine()
        .advance_to_next_step(workflow.id, None, t.carol, None)
        .await
        .unwrap();
    assert_eq!(done.current_step, 3);
    assert_eq!(done.lifecycle_status, LifecycleStatus::Completed);
    assert_eq!(done.progress_percentage, 100);

    let err = t
        .engine()
        .advance_to_next_step(workflow.id, Some(t.alice), t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let history = t.engine().get_workflow_history(workflow.id).await.unwrap();
    let kinds: Vec<TransitionType> = history.iter().map(|h| h.transition_type).collect();
    assert_eq!(
        kinds,
        vec![
            TransitionType::Assignment,
            TransitionType::StepChange,
            TransitionType::StepChange,
            TransitionType::StatusChange,
        ]
    );
    assert_eq!(history[1].from_step, Some(1));
    assert_eq!(history[1].to_step, Some(2));
    assert_eq!(history[1].from_user_id, Some(t.alice));
    assert_eq!(history[1].to_user_id, Some(t.bob));
    assert_eq!(history[1].comments.as_deref(), Some("Drafted"));
    assert_eq!(history[3].to_status.as_deref(), Some("completed"));

    let assignments = t.services.store.list_assignments(workflow.id).await.unwrap();
    assert_eq!(assignments.len(), 3);
    assert!(assignments.iter().all(|a| !a.is_active()));
    assert!(assignments.iter().all(|a| a.completion_date.is_some()));

    let creator_inbox = t
        .engine()
        .notifications()
        .get_user_notifications(t.creator, false, None)
        .await
        .unwrap();
    assert_eq!(creator_inbox.len(), 1);
    assert_eq!(creator_inbox[0].notification_type, NotificationType::StatusChange);
}

#[tokio::test]
async fn test_every_state_change_writes_exactly_one_transition() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;
    assert_eq!(t.memory.transition_count().await, 1);

    t.engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Paused, t.creator, None)
        .await
        .unwrap();
    assert_eq!(t.memory.transition_count().await, 2);

    t.engine()
        .update_workflow_status(workflow.id, LifecycleStatus::InProgress, t.creator, None)
        .await
        .unwrap();
    assert_eq!(t.memory.transition_count().await, 3);

    t.engine()
        .assign_step(workflow.id, 2, t.bob, t.creator, None)
        .await
        .unwrap();
    assert_eq!(t.memory.transition_count().await, 4);

    // Rejected operations leave the ledger untouched
    let _ = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Archived, t.creator, None)
        .await
        .unwrap_err();
    assert_eq!(t.memory.transition_count().await, 4);

    // Metadata edits are not state changes
    t.engine()
        .update_workflow(
            workflow.id,
            UpdateWorkflowRequest {
                title: Some("Buy twelve laptops".into()),
                ..UpdateWorkflowRequest::default()
            },
            t.creator,
        )
        .await
        .unwrap();
    assert_eq!(t.memory.transition_count().await, 4);
}

#[tokio::test]
async fn test_lifecycle_edges_follow_the_table() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;

    let paused = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Paused, t.alice, None)
        .await
        .unwrap();
    assert_eq!(paused.lifecycle_status, LifecycleStatus::Paused);

    let err = t
        .engine()
        .advance_to_next_step(workflow.id, Some(t.bob), t.alice, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let err = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Completed, t.alice, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let canceled = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Canceled, t.creator, None)
        .await
        .unwrap();
    assert_eq!(canceled.lifecycle_status, LifecycleStatus::Canceled);

    let err = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::InProgress, t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let archived = t
        .engine()
        .archive_workflow(workflow.id, t.creator, None)
        .await
        .unwrap();
    assert_eq!(archived.lifecycle_status, LifecycleStatus::Archived);

    // Pause and cancel notify assignee and creator; archiving notifies nobody
    let alice_inbox = t
        .engine()
        .notifications()
        .get_user_notifications(t.alice, false, None)
        .await
        .unwrap();
    let status_notices = alice_inbox
        .iter()
        .filter(|n| n.notification_type == NotificationType::StatusChange)
        .count();
    assert_eq!(status_notices, 2);
}

#[tokio::test]
async fn test_restore_recomputes_progress() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;
    t.engine()
        .advance_to_next_step(workflow.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();

    let completed = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Completed, t.bob, None)
        .await
        .unwrap();
    assert_eq!(completed.progress_percentage, 100);

    let err = t
        .engine()
        .restore_workflow(workflow.id, t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let assignments_before = t.services.store.list_assignments(workflow.id).await.unwrap();
    let users = [t.creator, t.alice, t.bob];
    let notices_before = inbox_sizes(&t, &users).await;

    t.engine()
        .archive_workflow(workflow.id, t.creator, None)
        .await
        .unwrap();

    let err = t
        .engine()
        .update_workflow(workflow.id, UpdateWorkflowRequest::default(), t.creator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let restored = t
        .engine()
        .restore_workflow(workflow.id, t.creator, None)
        .await
        .unwrap();
    assert_eq!(restored.lifecycle_status, LifecycleStatus::InProgress);
    assert_eq!(restored.current_step, 2);
    assert_eq!(restored.progress_percentage, 33);
    assert_eq!(restored.completed_at, None);

    // Archive and restore touch only the status: same assignments, no notices
    let assignments_after = t.services.store.list_assignments(workflow.id).await.unwrap();
    assert_eq!(assignments_after, assignments_before);
    assert_eq!(inbox_sizes(&t, &users).await, notices_before);
}

#[tokio::test]
async fn test_permission_gate() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;

    assert!(t.engine().can_user_modify(t.creator, workflow.id).await.unwrap());
    assert!(t.engine().can_user_modify(t.alice, workflow.id).await.unwrap());
    assert!(t.engine().can_user_modify(t.admin, workflow.id).await.unwrap());
    assert!(!t.engine().can_user_modify(t.outsider, workflow.id).await.unwrap());

    let err = t
        .engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Paused, t.outsider, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    // Once step 2 belongs to bob, alice loses modify rights
    t.engine()
        .advance_to_next_step(workflow.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();
    let err = t
        .engine()
        .advance_to_next_step(workflow.id, Some(t.carol), t.alice, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    t.engine()
        .advance_to_next_step(workflow.id, Some(t.carol), t.admin, None)
        .await
        .unwrap();

    let err = t
        .engine()
        .delete_workflow(workflow.id, t.carol)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    t.engine().delete_workflow(workflow.id, t.creator).await.unwrap();
    let err = t.engine().get_workflow(workflow.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(t.memory.transition_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_advances_are_serialized() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;
    let engine = t.engine().clone();

    let first = {
        let engine = engine.clone();
        let (id, actor, next) = (workflow.id, t.creator, t.bob);
        tokio::spawn(async move { engine.advance_to_next_step(id, Some(next), actor, None).await })
    };
    let second = {
        let engine = engine.clone();
        let (id, actor, next) = (workflow.id, t.creator, t.carol);
        tokio::spawn(async move { engine.advance_to_next_step(id, Some(next), actor, None).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let current = engine.get_workflow(workflow.id).await.unwrap();
    assert_eq!(current.current_step, 3);
    assert_eq!(current.progress_percentage, 66);

    let assignments = t.services.store.list_assignments(workflow.id).await.unwrap();
    for step in 1..=3 {
        let active = assignments
            .iter()
            .filter(|a| a.step_number == step && a.is_active())
            .count();
        assert!(active <= 1, "step {} has {} active assignments", step, active);
    }
    let step_changes = engine
        .get_workflow_history(workflow.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|h| h.transition_type == TransitionType::StepChange)
        .count();
    assert_eq!(step_changes, 2);
}

#[tokio::test]
async fn test_update_workflow_metadata() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;

    let updated = t
        .engine()
        .update_workflow(
            workflow.id,
            UpdateWorkflowRequest {
                title: Some("  Buy monitors ".into()),
                deadline: Some(None),
                team_id: Some(Some(t.team_id)),
                ..UpdateWorkflowRequest::default()
            },
            t.alice,
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Buy monitors");
    assert_eq!(updated.deadline, None);
    assert_eq!(updated.team_id, Some(t.team_id));
    assert!(updated.updated_at > workflow.updated_at);

    let err = t
        .engine()
        .update_workflow(
            workflow.id,
            UpdateWorkflowRequest {
                deadline: Some(Some(Utc::now() - Duration::days(1))),
                ..UpdateWorkflowRequest::default()
            },
            t.alice,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = t
        .engine()
        .update_workflow(
            workflow.id,
            UpdateWorkflowRequest {
                team_id: Some(Some(Uuid::new_v4())),
                ..UpdateWorkflowRequest::default()
            },
            t.alice,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = t
        .engine()
        .update_workflow(
            workflow.id,
            UpdateWorkflowRequest {
                title: Some(" \t ".into()),
                ..UpdateWorkflowRequest::default()
            },
            t.alice,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let stored = t.engine().get_workflow(workflow.id).await.unwrap();
    assert_eq!(stored.title, "Buy monitors");
}

#[tokio::test]
async fn test_list_workflows_filters_and_pages() {
    let t = setup_engine().await;
    let first = t.create_workflow().await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = t.create_workflow().await;
    t.engine()
        .advance_to_next_step(second.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();
    t.engine()
        .update_workflow_status(first.id, LifecycleStatus::Paused, t.creator, None)
        .await
        .unwrap();

    let all = t
        .engine()
        .list_workflows(&WorkflowFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.items[0].id, second.id);

    let bobs = t
        .engine()
        .list_workflows(
            &WorkflowFilter {
                assigned_to: Some(t.bob),
                ..WorkflowFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(bobs.total, 1);
    assert_eq!(bobs.items[0].id, second.id);

    let paused = t
        .engine()
        .list_workflows(
            &WorkflowFilter {
                lifecycle_status: Some(LifecycleStatus::Paused),
                search: Some("LAPTOP".into()),
                ..WorkflowFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(paused.total, 1);
    assert_eq!(paused.items[0].id, first.id);

    let page = t
        .engine()
        .list_workflows(&WorkflowFilter::default(), Page::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, first.id);
}
