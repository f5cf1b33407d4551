//! Transition ledger: builds the immutable audit rows and reads them back in order.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use flowdesk_core::models::{TransitionType, WorkflowTransition};
use flowdesk_core::AppError;

use crate::store::EngineStore;

/// Builder for one transition row
#[derive(Debug, Clone)]
pub struct TransitionBuilder {
    row: WorkflowTransition,
}

impl TransitionBuilder {
    pub fn new(
        workflow_id: Uuid,
        transition_type: TransitionType,
        created_by: Uuid,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            row: WorkflowTransition {
                id: Uuid::new_v4(),
                workflow_id,
                from_step: None,
                to_step: None,
                from_status: None,
                to_status: None,
                from_user_id: None,
                to_user_id: None,
                comments: None,
                transition_type,
                created_by,
                created_at: at,
            },
        }
    }

    pub fn steps(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.row.from_step = from;
        self.row.to_step = to;
        self
    }

    pub fn statuses(mut self, from: Option<&str>, to: Option<&str>) -> Self {
        self.row.from_status = from.map(str::to_string);
        self.row.to_status = to.map(str::to_string);
        self
    }

    pub fn users(mut self, from: Option<Uuid>, to: Option<Uuid>) -> Self {
        self.row.from_user_id = from;
        self.row.to_user_id = to;
        self
    }

    pub fn comments(mut self, comments: Option<String>) -> Self {
        self.row.comments = comments.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn build(self) -> WorkflowTransition {
        self.row
    }
}

#[derive(Clone)]
pub struct TransitionLedger {
    store: EngineStore,
}

impl TransitionLedger {
    pub fn new(store: EngineStore) -> Self {
        Self { store }
    }

    /// Every transition of a workflow, oldest first.
    #[tracing::instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn history(&self, workflow_id: Uuid) -> Result<Vec<WorkflowTransition>, AppError> {
        self.store
            .bounded(
                "list_transitions",
                self.store.workflows().list_transitions(workflow_id),
            )
            .await
    }

    /// Transitions that touched `step_number` as source or target.
    pub async fn history_for_step(
        &self,
        workflow_id: Uuid,
        step_number: i32,
    ) -> Result<Vec<WorkflowTransition>, AppError> {
        Ok(self
            .history(workflow_id)
            .await?
            .into_iter()
            .filter(|t| t.from_step == Some(step_number) || t.to_step == Some(step_number))
            .collect())
    }
}
