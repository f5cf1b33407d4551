//! Workload and dashboard statistics.
//!
//! Run with: `cargo test -p flowdesk-services --test stats_test`

mod helpers;

use chrono::{Duration, Utc};

use flowdesk_core::models::{LifecycleStatus, Priority, UpdateWorkflowRequest};
use flowdesk_core::EngineConfig;
use helpers::{setup_engine, setup_engine_with};

#[tokio::test]
async fn test_user_workload_against_threshold() {
    let t = setup_engine_with(EngineConfig {
        workload_threshold: 2,
        ..EngineConfig::default()
    })
    .await;
    for _ in 0..3 {
        t.create_workflow().await;
    }
    let overdue = t.create_workflow().await;
    t.force_deadline(overdue.id, Some(Utc::now() - Duration::hours(1)))
        .await;
    t.engine()
        .start_step(overdue.id, 1, t.alice, None)
        .await
        .unwrap();

    let alice = t.engine().assignments().get_user_workload(t.alice).await.unwrap();
    assert_eq!(alice.active, 4);
    assert_eq!(alice.pending, 3);
    assert_eq!(alice.in_progress, 1);
    assert_eq!(alice.overdue, 1);
    assert_eq!(alice.workload_percentage, 200.0);
    assert!(alice.overloaded);

    // Cancelled work no longer counts as active
    t.engine()
        .update_workflow_status(overdue.id, LifecycleStatus::Canceled, t.creator, None)
        .await
        .unwrap();
    let alice = t.engine().assignments().get_user_workload(t.alice).await.unwrap();
    assert_eq!(alice.active, 3);
    assert_eq!(alice.total, 4);
    assert_eq!(alice.workload_percentage, 150.0);

    let bob = t.engine().assignments().get_user_workload(t.bob).await.unwrap();
    assert_eq!(bob.active, 0);
    assert_eq!(bob.workload_percentage, 0.0);
    assert!(!bob.overloaded);
}

#[tokio::test]
async fn test_users_workload_is_sorted_heaviest_first() {
    let t = setup_engine().await;
    let first = t.create_workflow().await;
    t.create_workflow().await;
    t.engine()
        .advance_to_next_step(first.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();

    let loads = t.services.stats.get_users_workload().await.unwrap();
    assert_eq!(loads.len(), 2);
    assert_eq!(loads[0].user_id, t.alice);
    assert_eq!(loads[0].active, 1);
    assert_eq!(loads[0].total, 2);
    assert_eq!(loads[1].user_id, t.bob);
    assert_eq!(loads[1].workload_percentage, 10.0);
}

#[tokio::test]
async fn test_general_stats() {
    let t = setup_engine().await;
    let done = t.create_workflow().await;
    let late = t.create_workflow().await;

    let mut urgent = t.request(t.bob);
    urgent.priority = Priority::Urgent;
    urgent.deadline = None;
    urgent.team_id = Some(t.team_id);
    t.engine().create_workflow(urgent, t.creator).await.unwrap();

    t.engine()
        .advance_to_next_step(done.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();
    t.engine()
        .update_workflow_status(done.id, LifecycleStatus::Completed, t.bob, None)
        .await
        .unwrap();
    t.force_deadline(late.id, Some(Utc::now() - Duration::minutes(10)))
        .await;

    let stats = t.services.stats.get_general_workflow_stats().await.unwrap();
    assert_eq!(stats.total_workflows, 3);
    assert_eq!(stats.by_status["completed"], 1);
    assert_eq!(stats.by_status["in_progress"], 2);
    assert_eq!(stats.by_status["archived"], 0);
    assert_eq!(stats.by_priority["urgent"], 1);
    assert_eq!(stats.by_priority["medium"], 2);
    assert_eq!(stats.by_visibility["public"], 3);
    assert_eq!(stats.completed_count, 1);
    assert_eq!(stats.overdue_count, 1);
    assert_eq!(stats.near_deadline_count, 0);
    assert_eq!(stats.on_track_count, 1);
    assert!((stats.completion_rate - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.on_time_completion_rate, 1.0);
    assert!(stats.average_time_per_step_hours.is_some());

    assert_eq!(stats.by_template.len(), 1);
    assert_eq!(stats.by_template[0].template_name, "Purchase approval");
    assert_eq!(stats.by_template[0].total, 3);
    assert_eq!(stats.by_template[0].completed, 1);

    assert_eq!(stats.by_team.len(), 2);
    let no_team = stats.by_team.iter().find(|s| s.team_id.is_none()).unwrap();
    assert_eq!(no_team.total, 2);
    assert_eq!(no_team.overdue, 1);
}

#[tokio::test]
async fn test_user_stats() {
    let t = setup_engine().await;
    let first = t.create_workflow().await;
    t.create_workflow().await;
    t.engine()
        .advance_to_next_step(first.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();

    let creator = t.services.stats.get_user_workflow_stats(t.creator).await.unwrap();
    assert_eq!(creator.created_count, 2);
    assert_eq!(creator.assigned_count, 0);
    assert_eq!(creator.by_status["in_progress"], 2);

    let alice = t.services.stats.get_user_workflow_stats(t.alice).await.unwrap();
    assert_eq!(alice.created_count, 0);
    assert_eq!(alice.assigned_count, 1);
    assert_eq!(alice.pending_assignments, 1);
    assert_eq!(alice.completed_assignments, 1);
    assert_eq!(alice.near_deadline_count, 2);
    assert!(alice.average_time_per_step_hours.is_some());

    let bob = t.services.stats.get_user_workflow_stats(t.bob).await.unwrap();
    assert_eq!(bob.assigned_count, 1);
    assert_eq!(bob.by_status["in_progress"], 1);
    assert_eq!(bob.average_time_per_step_hours, None);

    let carol = t.services.stats.get_user_workflow_stats(t.carol).await.unwrap();
    assert_eq!(carol.created_count, 0);
    assert_eq!(carol.assigned_count, 0);
    assert_eq!(carol.pending_assignments, 0);
    assert!(carol.by_status.values().all(|count| *count == 0));
}

#[tokio::test]
async fn test_edit_after_deadline_keeps_completion_on_time() {
    let t = setup_engine().await;
    let workflow = t.create_workflow().await;
    t.engine()
        .advance_to_next_step(workflow.id, Some(t.bob), t.alice, None)
        .await
        .unwrap();
    t.engine()
        .advance_to_next_step(workflow.id, Some(t.carol), t.bob, None)
        .await
        .unwrap();
    let done = t
        .engine()
        .advance_to_next_step(workflow.id, None, t.carol, None)
        .await
        .unwrap();
    assert_eq!(done.lifecycle_status, LifecycleStatus::Completed);
    let completed_at = done.completed_at.expect("completion instant recorded");

    // Deadline falls between completion and the later edit
    t.force_deadline(workflow.id, Some(completed_at + Duration::milliseconds(1)))
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let edited = t
        .engine()
        .update_workflow(
            workflow.id,
            UpdateWorkflowRequest {
                description: Some(Some("Receipts attached".to_string())),
                ..UpdateWorkflowRequest::default()
            },
            t.creator,
        )
        .await
        .unwrap();
    assert!(edited.updated_at > completed_at + Duration::milliseconds(1));
    assert_eq!(edited.completed_at, Some(completed_at));

    let stats = t.services.stats.get_general_workflow_stats().await.unwrap();
    assert_eq!(stats.completed_count, 1);
    assert_eq!(stats.on_time_completion_rate, 1.0);
}
