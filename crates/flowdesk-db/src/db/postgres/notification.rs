//! In-app notification repository

use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use flowdesk_core::models::WorkflowNotification;
use flowdesk_core::AppError;

use crate::db::traits::NotificationRepositoryTrait;

#[derive(Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationRepositoryTrait for PostgresNotificationRepository {
    #[tracing::instrument(skip(self, notification), fields(
        db.system = "postgresql",
        db.table = "workflow_notifications",
        db.operation = "insert",
        db.record_id = %notification.id
    ))]
    async fn insert_notification(
        &self,
        notification: &WorkflowNotification,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_notifications
                (id, workflow_id, user_id, title, message, notification_type, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.workflow_id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.notification_type)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_notifications",
        db.operation = "select"
    ))]
    async fn list_notifications_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<WorkflowNotification>, AppError> {
        let rows = sqlx::query_as::<Postgres, WorkflowNotification>(
            r#"
            SELECT id, workflow_id, user_id, title, message, notification_type, read, created_at
            FROM workflow_notifications
            WHERE user_id = $1 AND (NOT $2 OR read = FALSE)
            ORDER BY seq DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_notifications",
        db.operation = "update",
        db.record_id = %id
    ))]
    async fn mark_read(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE workflow_notifications SET read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_notifications",
        db.operation = "update"
    ))]
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE workflow_notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
