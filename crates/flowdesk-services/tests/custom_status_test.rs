//! Custom status items from an attached status template.
//!
//! Run with: `cargo test -p flowdesk-services --test custom_status_test`

mod helpers;

use uuid::Uuid;

use flowdesk_core::models::{LifecycleStatus, NotificationType, TransitionType};
use flowdesk_core::AppError;
use helpers::setup_engine;

#[tokio::test]
async fn test_custom_status_moves_freely_between_items() {
    let t = setup_engine().await;
    let board = t.create_status_template().await;
    let open = board.initial_item().unwrap().clone();
    let item = |name: &str| board.items.iter().find(|i| i.name == name).unwrap().clone();

    let mut request = t.request(t.alice);
    request.status_template_id = Some(board.id);
    let workflow = t.engine().create_workflow(request, t.creator).await.unwrap();
    assert_eq!(workflow.custom_status_id, Some(open.id));

    // Straight to the last item, then back to the first: no ordering is enforced
    let done = t
        .engine()
        .update_workflow_custom_status(workflow.id, item("Done").id, t.alice, None)
        .await
        .unwrap();
    assert_eq!(done.custom_status_id, Some(item("Done").id));
    assert_eq!(done.lifecycle_status, LifecycleStatus::InProgress);

    let back = t
        .engine()
        .update_workflow_custom_status(workflow.id, open.id, t.alice, Some("Reopened".into()))
        .await
        .unwrap();
    assert_eq!(back.custom_status_id, Some(open.id));

    let history = t.engine().get_workflow_history(workflow.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.transition_type, TransitionType::StatusChange);
    assert_eq!(last.from_status.as_deref(), Some("Done"));
    assert_eq!(last.to_status.as_deref(), Some("Open"));
    assert_eq!(last.comments.as_deref(), Some("Reopened"));

    let details = t.engine().get_workflow_details(workflow.id).await.unwrap();
    assert_eq!(details.custom_status.map(|i| i.name), Some("Open".to_string()));

    let creator_inbox = t
        .engine()
        .notifications()
        .get_user_notifications(t.creator, false, None)
        .await
        .unwrap();
    assert_eq!(
        creator_inbox
            .iter()
            .filter(|n| n.notification_type == NotificationType::StatusChange)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_custom_status_rejections() {
    let t = setup_engine().await;
    let board = t.create_status_template().await;
    let other = t.create_status_template().await;

    let plain = t.create_workflow().await;
    let err = t
        .engine()
        .update_workflow_custom_status(plain.id, board.items[0].id, t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = t.request(t.alice);
    request.status_template_id = Some(board.id);
    let workflow = t.engine().create_workflow(request, t.creator).await.unwrap();

    let err = t
        .engine()
        .update_workflow_custom_status(workflow.id, other.items[1].id, t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = t
        .engine()
        .update_workflow_custom_status(workflow.id, Uuid::new_v4(), t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    t.engine()
        .update_workflow_status(workflow.id, LifecycleStatus::Canceled, t.creator, None)
        .await
        .unwrap();
    // Terminal but not archived: custom status can still change
    t.engine()
        .update_workflow_custom_status(workflow.id, board.items[2].id, t.creator, None)
        .await
        .unwrap();

    t.engine()
        .archive_workflow(workflow.id, t.creator, None)
        .await
        .unwrap();
    let err = t
        .engine()
        .update_workflow_custom_status(workflow.id, board.items[1].id, t.creator, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}
