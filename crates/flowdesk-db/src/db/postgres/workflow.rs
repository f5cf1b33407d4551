//! Workflow instance repository: workflow rows, assignments and the transition log

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use flowdesk_core::models::{
    Page, Workflow, WorkflowAssignment, WorkflowFilter, WorkflowTransition,
};
use flowdesk_core::AppError;

use crate::db::traits::{WorkflowChangeSet, WorkflowRepositoryTrait};
use crate::db::transaction::TransactionGuard;

const WORKFLOW_COLUMNS: &str = "id, template_id, status_template_id, title, description, priority, \
     lifecycle_status, custom_status_id, visibility, deadline, team_id, created_by, \
     current_step, total_steps, progress_percentage, completed_at, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str =
    "id, workflow_id, step_number, assigned_to, status, start_date, completion_date";

const TRANSITION_COLUMNS: &str = "id, workflow_id, from_step, to_step, from_status, to_status, \
     from_user_id, to_user_id, comments, transition_type, created_by, created_at";

/// Every filter field is optional; `$n IS NULL` disables the predicate.
const FILTER_PREDICATE: &str = r#"
    ($1::text IS NULL OR w.lifecycle_status = $1)
    AND ($2::text IS NULL OR w.priority = $2)
    AND ($3::text IS NULL OR w.visibility = $3)
    AND ($4::uuid IS NULL OR w.team_id = $4)
    AND ($5::uuid IS NULL OR w.template_id = $5)
    AND ($6::uuid IS NULL OR w.created_by = $6)
    AND ($7::uuid IS NULL OR EXISTS (
        SELECT 1 FROM workflow_assignments a
        WHERE a.workflow_id = w.id
          AND a.step_number = w.current_step
          AND a.status <> 'completed'
          AND a.assigned_to = $7
    ))
    AND ($8::text IS NULL OR w.title ILIKE '%' || $8 || '%')
"#;

fn escape_like(search: &str) -> String {
    search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(Clone)]
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Assignment upserts, the transition row and notifications of a change set.
    async fn write_dependents(
        tx: &mut TransactionGuard<'_>,
        changes: &WorkflowChangeSet,
    ) -> Result<(), AppError> {
        for assignment in &changes.assignments {
            sqlx::query(
                r#"
                INSERT INTO workflow_assignments
                    (id, workflow_id, step_number, assigned_to, status, start_date, completion_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE
                SET assigned_to = EXCLUDED.assigned_to,
                    status = EXCLUDED.status,
                    start_date = EXCLUDED.start_date,
                    completion_date = EXCLUDED.completion_date
                "#,
            )
            .bind(assignment.id)
            .bind(assignment.workflow_id)
            .bind(assignment.step_number)
            .bind(assignment.assigned_to)
            .bind(assignment.status)
            .bind(assignment.start_date)
            .bind(assignment.completion_date)
            .execute(&mut ***tx)
            .await?;
        }

        let t = &changes.transition;
        sqlx::query(
            r#"
            INSERT INTO workflow_transitions
                (id, workflow_id, from_step, to_step, from_status, to_status,
                 from_user_id, to_user_id, comments, transition_type, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(t.id)
        .bind(t.workflow_id)
        .bind(t.from_step)
        .bind(t.to_step)
        .bind(&t.from_status)
        .bind(&t.to_status)
        .bind(t.from_user_id)
        .bind(t.to_user_id)
        .bind(&t.comments)
        .bind(t.transition_type)
        .bind(t.created_by)
        .bind(t.created_at)
        .execute(&mut ***tx)
        .await?;

        for n in &changes.notifications {
            sqlx::query(
                r#"
                INSERT INTO workflow_notifications
                    (id, workflow_id, user_id, title, message, notification_type, read, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(n.id)
            .bind(n.workflow_id)
            .bind(n.user_id)
            .bind(&n.title)
            .bind(&n.message)
            .bind(n.notification_type)
            .bind(n.read)
            .bind(n.created_at)
            .execute(&mut ***tx)
            .await?;
        }
        Ok(())
    }

    /// Distinguish a missing row from a stale version after a conditional update missed.
    async fn missed_update_error(&self, id: Uuid) -> Result<AppError, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM workflows WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(if exists {
            AppError::Conflict(format!("Workflow {} was modified concurrently", id))
        } else {
            AppError::not_found("Workflow", id)
        })
    }
}

#[async_trait::async_trait]
impl WorkflowRepositoryTrait for PostgresWorkflowRepository {
    #[tracing::instrument(skip(self, changes), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "insert",
        db.record_id = %changes.workflow.id
    ))]
    async fn insert_workflow(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        let w = &changes.workflow;
        let mut tx = TransactionGuard::begin(&self.pool, "insert_workflow").await?;
        sqlx::query(&format!(
            "INSERT INTO workflows ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
            WORKFLOW_COLUMNS
        ))
        .bind(w.id)
        .bind(w.template_id)
        .bind(w.status_template_id)
        .bind(&w.title)
        .bind(&w.description)
        .bind(w.priority)
        .bind(w.lifecycle_status)
        .bind(w.custom_status_id)
        .bind(w.visibility)
        .bind(w.deadline)
        .bind(w.team_id)
        .bind(w.created_by)
        .bind(w.current_step)
        .bind(w.total_steps)
        .bind(w.progress_percentage)
        .bind(w.completed_at)
        .bind(w.created_at)
        .bind(w.updated_at)
        .execute(&mut **tx)
        .await?;

        Self::write_dependents(&mut tx, changes).await?;
        tx.commit().await
    }

    #[tracing::instrument(skip(self, changes), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "update",
        db.record_id = %changes.workflow.id
    ))]
    async fn apply_changes(&self, changes: &WorkflowChangeSet) -> Result<(), AppError> {
        let w = &changes.workflow;
        let expected = changes.expected_updated_at.ok_or_else(|| {
            AppError::Internal("Change set for an existing workflow lacks a version".to_string())
        })?;

        let mut tx = TransactionGuard::begin(&self.pool, "apply_changes").await?;
        let updated = sqlx::query(
            r#"
            UPDATE workflows
            SET lifecycle_status = $3,
                custom_status_id = $4,
                current_step = $5,
                progress_percentage = $6,
                completed_at = $7,
                updated_at = $8
            WHERE id = $1 AND updated_at = $2
            "#,
        )
        .bind(w.id)
        .bind(expected)
        .bind(w.lifecycle_status)
        .bind(w.custom_status_id)
        .bind(w.current_step)
        .bind(w.progress_percentage)
        .bind(w.completed_at)
        .bind(w.updated_at)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.missed_update_error(w.id).await?);
        }

        Self::write_dependents(&mut tx, changes).await?;
        tx.commit().await
    }

    #[tracing::instrument(skip(self, workflow), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "update",
        db.record_id = %workflow.id
    ))]
    async fn update_workflow_details(
        &self,
        workflow: &Workflow,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE workflows
            SET title = $3,
                description = $4,
                priority = $5,
                visibility = $6,
                deadline = $7,
                team_id = $8,
                updated_at = $9
            WHERE id = $1 AND updated_at = $2
            "#,
        )
        .bind(workflow.id)
        .bind(expected_updated_at)
        .bind(&workflow.title)
        .bind(&workflow.description)
        .bind(workflow.priority)
        .bind(workflow.visibility)
        .bind(workflow.deadline)
        .bind(workflow.team_id)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.missed_update_error(workflow.id).await?);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "select",
        db.record_id = %id
    ))]
    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, AppError> {
        let workflow = sqlx::query_as::<Postgres, Workflow>(&format!(
            "SELECT {} FROM workflows WHERE id = $1",
            WORKFLOW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(workflow)
    }

    #[tracing::instrument(skip(self, filter), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "select"
    ))]
    async fn list_workflows(
        &self,
        filter: &WorkflowFilter,
        page: Page,
    ) -> Result<Vec<Workflow>, AppError> {
        let columns = WORKFLOW_COLUMNS
            .split(", ")
            .map(|c| format!("w.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM workflows w WHERE {} ORDER BY w.created_at DESC, w.id DESC LIMIT $9 OFFSET $10",
            columns, FILTER_PREDICATE
        );
        let rows = sqlx::query_as::<Postgres, Workflow>(&sql)
            .bind(filter.lifecycle_status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.visibility.map(|v| v.as_str()))
            .bind(filter.team_id)
            .bind(filter.template_id)
            .bind(filter.created_by)
            .bind(filter.assigned_to)
            .bind(filter.search.as_deref().map(escape_like))
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self, filter), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "count"
    ))]
    async fn count_workflows(&self, filter: &WorkflowFilter) -> Result<i64, AppError> {
        let sql = format!("SELECT COUNT(*) FROM workflows w WHERE {}", FILTER_PREDICATE);
        let count = sqlx::query_scalar::<Postgres, i64>(&sql)
            .bind(filter.lifecycle_status.map(|s| s.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.visibility.map(|v| v.as_str()))
            .bind(filter.team_id)
            .bind(filter.template_id)
            .bind(filter.created_by)
            .bind(filter.assigned_to)
            .bind(filter.search.as_deref().map(escape_like))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "count"
    ))]
    async fn count_by_template(
        &self,
        template_id: Uuid,
        include_archived: bool,
    ) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>(
            r#"
            SELECT COUNT(*) FROM workflows
            WHERE template_id = $1 AND ($2 OR lifecycle_status <> 'archived')
            "#,
        )
        .bind(template_id)
        .bind(include_archived)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_assignments",
        db.operation = "select"
    ))]
    async fn list_assignments(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        let rows = sqlx::query_as::<Postgres, WorkflowAssignment>(&format!(
            "SELECT {} FROM workflow_assignments WHERE workflow_id = $1 ORDER BY start_date ASC, id ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_assignments",
        db.operation = "select"
    ))]
    async fn list_assignments_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkflowAssignment>, AppError> {
        let rows = sqlx::query_as::<Postgres, WorkflowAssignment>(&format!(
            "SELECT {} FROM workflow_assignments WHERE assigned_to = $1 ORDER BY start_date ASC, id ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_assignments",
        db.operation = "select"
    ))]
    async fn list_all_assignments(&self) -> Result<Vec<WorkflowAssignment>, AppError> {
        let rows = sqlx::query_as::<Postgres, WorkflowAssignment>(&format!(
            "SELECT {} FROM workflow_assignments ORDER BY start_date ASC, id ASC",
            ASSIGNMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflow_transitions",
        db.operation = "select"
    ))]
    async fn list_transitions(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowTransition>, AppError> {
        let rows = sqlx::query_as::<Postgres, WorkflowTransition>(&format!(
            "SELECT {} FROM workflow_transitions WHERE workflow_id = $1 ORDER BY seq ASC",
            TRANSITION_COLUMNS
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(
        db.system = "postgresql",
        db.table = "workflows",
        db.operation = "delete",
        db.record_id = %id
    ))]
    async fn delete_workflow(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_done"), "50\\%\\_done");
        assert_eq!(escape_like("plain"), "plain");
    }
}
