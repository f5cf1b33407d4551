//! Notification dispatcher: composes `WorkflowNotification` rows and serves the
//! per-user inbox. Delivery beyond the row (e-mail, push) happens elsewhere.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use flowdesk_core::models::{NotificationType, Workflow, WorkflowNotification};
use flowdesk_core::AppError;

use crate::store::EngineStore;

pub const DEFAULT_INBOX_LIMIT: i64 = 50;
const MAX_INBOX_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: EngineStore,
}

impl NotificationDispatcher {
    pub fn new(store: EngineStore) -> Self {
        Self { store }
    }

    pub fn compose(
        workflow_id: Uuid,
        user_id: Uuid,
        title: impl Into<String>,
        message: impl Into<String>,
        notification_type: NotificationType,
        at: DateTime<Utc>,
    ) -> WorkflowNotification {
        WorkflowNotification {
            id: Uuid::new_v4(),
            workflow_id,
            user_id,
            title: title.into(),
            message: message.into(),
            notification_type,
            read: false,
            created_at: at,
        }
    }

    pub fn assignment_notice(
        workflow: &Workflow,
        step_number: i32,
        step_name: Option<&str>,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> WorkflowNotification {
        let step = match step_name {
            Some(name) => format!("step {} ({})", step_number, name),
            None => format!("step {}", step_number),
        };
        Self::compose(
            workflow.id,
            user_id,
            "New workflow assignment",
            format!(
                "You have been assigned {} of workflow '{}'",
                step, workflow.title
            ),
            NotificationType::Assignment,
            at,
        )
    }

    /// One status-change row per distinct recipient.
    pub fn status_change_notices(
        workflow: &Workflow,
        from: &str,
        to: &str,
        recipients: &[Uuid],
        at: DateTime<Utc>,
    ) -> Vec<WorkflowNotification> {
        let mut seen = Vec::with_capacity(recipients.len());
        for user in recipients {
            if !seen.contains(user) {
                seen.push(*user);
            }
        }
        seen.into_iter()
            .map(|user_id| {
                Self::compose(
                    workflow.id,
                    user_id,
                    "Workflow status changed",
                    format!(
                        "Workflow '{}' moved from {} to {}",
                        workflow.title, from, to
                    ),
                    NotificationType::StatusChange,
                    at,
                )
            })
            .collect()
    }

    pub fn deadline_notice(
        workflow: &Workflow,
        user_id: Uuid,
        days_remaining: Option<i64>,
        at: DateTime<Utc>,
    ) -> WorkflowNotification {
        let due = match days_remaining {
            Some(0) | None => "today".to_string(),
            Some(1) => "in 1 day".to_string(),
            Some(days) => format!("in {} days", days),
        };
        Self::compose(
            workflow.id,
            user_id,
            "Workflow deadline approaching",
            format!("Workflow '{}' is due {}", workflow.title, due),
            NotificationType::Deadline,
            at,
        )
    }

    /// Write one notification row directly.
    #[tracing::instrument(skip(self, title, message), fields(workflow_id = %workflow_id, user_id = %user_id))]
    pub async fn notify(
        &self,
        workflow_id: Uuid,
        user_id: Uuid,
        title: &str,
        message: &str,
        notification_type: NotificationType,
    ) -> Result<WorkflowNotification, AppError> {
        let notification = Self::compose(
            workflow_id,
            user_id,
            title,
            message,
            notification_type,
            Utc::now(),
        );
        self.deliver(&notification).await?;
        Ok(notification)
    }

    pub(crate) async fn deliver(&self, notification: &WorkflowNotification) -> Result<(), AppError> {
        self.store
            .bounded(
                "insert_notification",
                self.store.notifications().insert_notification(notification),
            )
            .await?;
        tracing::debug!(
            notification_id = %notification.id,
            kind = %notification.notification_type,
            "Notification stored"
        );
        Ok(())
    }

    /// Newest first. `limit` defaults to 50 and is capped at 500.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<WorkflowNotification>, AppError> {
        let limit = limit
            .unwrap_or(DEFAULT_INBOX_LIMIT)
            .clamp(1, MAX_INBOX_LIMIT);
        self.store
            .bounded(
                "list_notifications_for_user",
                self.store
                    .notifications()
                    .list_notifications_for_user(user_id, unread_only, limit),
            )
            .await
    }

    /// Idempotent; a missing id is `NotFound`.
    #[tracing::instrument(skip(self), fields(notification_id = %notification_id))]
    pub async fn mark_read(&self, notification_id: Uuid) -> Result<(), AppError> {
        let found = self
            .store
            .bounded(
                "mark_read",
                self.store.notifications().mark_read(notification_id),
            )
            .await?;
        if !found {
            return Err(AppError::not_found("Notification", notification_id));
        }
        Ok(())
    }

    /// Idempotent; returns how many rows flipped to read.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let changed = self
            .store
            .bounded(
                "mark_all_read",
                self.store.notifications().mark_all_read(user_id),
            )
            .await?;
        tracing::debug!(changed, "Marked notifications read");
        Ok(changed)
    }
}
