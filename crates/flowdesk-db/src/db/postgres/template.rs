//! Workflow template repository

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use uuid::Uuid;

use flowdesk_core::models::{Visibility, WorkflowTemplate, WorkflowTemplateStep};
use flowdesk_core::AppError;

use crate::db::traits::{DeleteOutcome, TemplateRepositoryTrait};
use crate::db::transaction::TransactionGuard;

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    visibility: Visibility,
    team_id: Option<Uuid>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TemplateRow {
    fn with_steps(self, steps: Vec<WorkflowTemplateStep>) -> WorkflowTemplate {
        WorkflowTemplate {
            id: self.id,
            name: self.name,
            description: self.description,
            visibility: self.visibility,
            team_id: self.team_id,
            created_by: self.created_by,
            steps,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_steps(
        tx: &mut TransactionGuard<'_>,
        steps: &[WorkflowTemplateStep],
    ) -> Result<(), AppError> {
        for step in steps {
            sqlx::query(
                r#"
                INSERT INTO workflow_template_steps (id, template_id, name, description, step_order)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(step.id)
            .bind(step.template_id)
            .bind(&step.name)
            .bind(&step.description)
            .bind(step.step_order)
            .execute(&mut ***tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TemplateRepositoryTrait for PostgresTemplateRepository {
    #[tracing::instrument(skip(self, template), fields(
        db.system = "postgresql",
        db.table = "workflow_templates",
        db.operation = "insert",
        db.record_id = %template.id
    ))]
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool, "insert_template").await?;
        sqlx::query(
            r#"
            INSERT INTO workflow_templates
                (id, name, description, visibility, team_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.visibility)
        .bind(template.team_id)
        .bind(template.created_by)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&mut **tx)
        .await?;
        Self::insert_steps(&mut tx, &template.steps).await?;
        tx.commit().await
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_templates",
        db.operation = "select",
        db.record_id = %id
    ))]
    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, AppError> {
        let row = sqlx::query_as::<Postgres, TemplateRow>(
            r#"
            SELECT id, name, description, visibility, team_id, created_by, created_at, updated_at
            FROM workflow_templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let steps = sqlx::query_as::<Postgres, WorkflowTemplateStep>(
            r#"
            SELECT id, template_id, name, description, step_order
            FROM workflow_template_steps
            WHERE template_id = $1
            ORDER BY step_order ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.with_steps(steps)))
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_templates",
        db.operation = "select"
    ))]
    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, AppError> {
        let rows = sqlx::query_as::<Postgres, TemplateRow>(
            r#"
            SELECT id, name, description, visibility, team_id, created_by, created_at, updated_at
            FROM workflow_templates
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let steps = sqlx::query_as::<Postgres, WorkflowTemplateStep>(
            r#"
            SELECT id, template_id, name, description, step_order
            FROM workflow_template_steps
            ORDER BY template_id, step_order ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_template: HashMap<Uuid, Vec<WorkflowTemplateStep>> = HashMap::new();
        for step in steps {
            by_template.entry(step.template_id).or_default().push(step);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let steps = by_template.remove(&row.id).unwrap_or_default();
                row.with_steps(steps)
            })
            .collect())
    }

    #[tracing::instrument(skip(self, template), fields(
        db.system = "postgresql",
        db.table = "workflow_templates",
        db.operation = "update",
        db.record_id = %template.id
    ))]
    async fn update_template(&self, template: &WorkflowTemplate) -> Result<bool, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool, "update_template").await?;
        let updated = sqlx::query(
            r#"
            UPDATE workflow_templates
            SET name = $2, description = $3, visibility = $4, team_id = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.visibility)
        .bind(template.team_id)
        .bind(template.updated_at)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM workflow_template_steps WHERE template_id = $1")
            .bind(template.id)
            .execute(&mut **tx)
            .await?;
        Self::insert_steps(&mut tx, &template.steps).await?;
        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_templates",
        db.operation = "delete",
        db.record_id = %id
    ))]
    async fn delete_template_if_unused(&self, id: Uuid) -> Result<DeleteOutcome, AppError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM workflow_templates t
            WHERE t.id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM workflows w
                  WHERE w.template_id = t.id AND w.lifecycle_status <> 'archived'
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
            "SELECT EXISTS(SELECT 1 FROM workflow_templates WHERE id = $1)",
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
