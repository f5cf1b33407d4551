//! Custom status template repository

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use uuid::Uuid;

use flowdesk_core::models::{WorkflowStatusItem, WorkflowStatusTemplate};
use flowdesk_core::AppError;

use crate::db::traits::{DeleteOutcome, StatusTemplateRepositoryTrait};
use crate::db::transaction::TransactionGuard;

#[derive(sqlx::FromRow)]
struct StatusTemplateRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl StatusTemplateRow {
    fn with_items(self, items: Vec<WorkflowStatusItem>) -> WorkflowStatusTemplate {
        WorkflowStatusTemplate {
            id: self.id,
            name: self.name,
            description: self.description,
            created_by: self.created_by,
            items,
            created_at: self.created_at,
        }
    }
}

const ITEM_COLUMNS: &str =
    "id, status_template_id, name, color, order_index, is_initial, is_final";

#[derive(Clone)]
pub struct PostgresStatusTemplateRepository {
    pool: PgPool,
}

impl PostgresStatusTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StatusTemplateRepositoryTrait for PostgresStatusTemplateRepository {
    #[tracing::instrument(skip(self, template), fields(
        db.system = "postgresql",
        db.table = "workflow_status_templates",
        db.operation = "insert",
        db.record_id = %template.id
    ))]
    async fn insert_status_template(
        &self,
        template: &WorkflowStatusTemplate,
    ) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool, "insert_status_template").await?;
        sqlx::query(
            r#"
            INSERT INTO workflow_status_templates (id, name, description, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.created_by)
        .bind(template.created_at)
        .execute(&mut **tx)
        .await?;

        for item in &template.items {
            sqlx::query(
                r#"
                INSERT INTO workflow_status_items
                    (id, status_template_id, name, color, order_index, is_initial, is_final)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id)
            .bind(item.status_template_id)
            .bind(&item.name)
            .bind(&item.color)
            .bind(item.order_index)
            .bind(item.is_initial)
            .bind(item.is_final)
            .execute(&mut **tx)
            .await?;
        }
        tx.commit().await
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_status_templates",
        db.operation = "select",
        db.record_id = %id
    ))]
    async fn get_status_template(
        &self,
        id: Uuid,
    ) -> Result<Option<WorkflowStatusTemplate>, AppError> {
        let row = sqlx::query_as::<Postgres, StatusTemplateRow>(
            "SELECT id, name, description, created_by, created_at FROM workflow_status_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<Postgres, WorkflowStatusItem>(&format!(
            "SELECT {} FROM workflow_status_items WHERE status_template_id = $1 ORDER BY order_index ASC",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.with_items(items)))
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_status_templates",
        db.operation = "select"
    ))]
    async fn list_status_templates(&self) -> Result<Vec<WorkflowStatusTemplate>, AppError> {
        let rows = sqlx::query_as::<Postgres, StatusTemplateRow>(
            "SELECT id, name, description, created_by, created_at FROM workflow_status_templates ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<Postgres, WorkflowStatusItem>(&format!(
            "SELECT {} FROM workflow_status_items ORDER BY status_template_id, order_index ASC",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_template: HashMap<Uuid, Vec<WorkflowStatusItem>> = HashMap::new();
        for item in items {
            by_template
                .entry(item.status_template_id)
                .or_default()
                .push(item);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = by_template.remove(&row.id).unwrap_or_default();
                row.with_items(items)
            })
            .collect())
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_status_templates",
        db.operation = "delete",
        db.record_id = %id
    ))]
    async fn delete_status_template_if_unused(
        &self,
        id: Uuid,
    ) -> Result<DeleteOutcome, AppError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM workflow_status_templates s
            WHERE s.id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM workflows w
                  WHERE w.status_template_id = s.id AND w.lifecycle_status <> 'archived'
              )
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if deleted.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM workflow_status_templates WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if exists {
            DeleteOutcome::InUse
        } else {
            DeleteOutcome::NotFound
        })
    }
}
