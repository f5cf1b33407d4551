//! Deadline monitor: the periodic scan that notifies assignees of workflows nearing
//! their deadline. The overdue/near-deadline predicates themselves live in
//! `flowdesk_core::deadline`.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use flowdesk_core::models::{LifecycleStatus, Page, Workflow, WorkflowFilter};
use flowdesk_core::{days_remaining, is_near_deadline, AppError, EngineConfig};

use crate::assignments::AssignmentTracker;
use crate::notifications::NotificationDispatcher;
use crate::store::EngineStore;

/// Outcome of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeadlineScanReport {
    /// Open workflows looked at
    pub examined: usize,
    /// Deadline notifications written
    pub notified: usize,
    /// Workflows skipped because a read or a write failed
    pub failed: usize,
    /// The scan stopped early on cancellation
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct DeadlineMonitor {
    store: EngineStore,
    dispatcher: NotificationDispatcher,
    days_threshold: i64,
    scan_interval: Duration,
}

impl DeadlineMonitor {
    pub fn new(store: EngineStore, dispatcher: NotificationDispatcher, config: &EngineConfig) -> Self {
        Self {
            store,
            dispatcher,
            days_threshold: config.deadline_days_threshold,
            scan_interval: Duration::from_secs(config.deadline_scan_interval_secs.max(1)),
        }
    }

    pub fn days_threshold(&self) -> i64 {
        self.days_threshold
    }

    async fn open_workflows(&self) -> Result<Vec<Workflow>, AppError> {
        let mut open = Vec::new();
        for status in [LifecycleStatus::InProgress, LifecycleStatus::Paused] {
            let filter = WorkflowFilter {
                lifecycle_status: Some(status),
                ..WorkflowFilter::default()
            };
            let batch = self
                .store
                .bounded(
                    "list_workflows",
                    self.store.workflows().list_workflows(&filter, Page::all()),
                )
                .await?;
            open.extend(batch);
        }
        Ok(open)
    }

    /// Notify the active assignee of the current step of every open workflow whose
    /// deadline is within `days_threshold` days.
    ///
    /// Repeated scans notify again; deduplication across runs is up to the caller.
    /// Cancellation stops before the next workflow; notifications already written stay.
    #[tracing::instrument(skip(self, cancel), fields(scan.days_threshold = days_threshold))]
    pub async fn check_and_send_deadline_notifications(
        &self,
        days_threshold: i64,
        cancel: &CancellationToken,
    ) -> Result<DeadlineScanReport, AppError> {
        let mut report = DeadlineScanReport::default();
        let workflows = self.open_workflows().await?;
        let now = Utc::now();

        for workflow in workflows {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.examined += 1;
            if !is_near_deadline(&workflow, days_threshold, now) {
                continue;
            }

            let assignments = match self.store.list_assignments(workflow.id).await {
                Ok(assignments) => assignments,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        workflow_id = %workflow.id,
                        "Failed to load assignments; skipping workflow"
                    );
                    report.failed += 1;
                    continue;
                }
            };
            let Some(active) =
                AssignmentTracker::active_for_step(&assignments, workflow.current_step)
            else {
                tracing::debug!(workflow_id = %workflow.id, "Near deadline but no active assignee");
                continue;
            };

            let notice = NotificationDispatcher::deadline_notice(
                &workflow,
                active.assigned_to,
                days_remaining(&workflow, now),
                Utc::now(),
            );
            match self.dispatcher.deliver(&notice).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        workflow_id = %workflow.id,
                        user_id = %active.assigned_to,
                        "Failed to store deadline notification"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            notified = report.notified,
            failed = report.failed,
            cancelled = report.cancelled,
            "Deadline scan finished"
        );
        Ok(report)
    }

    /// Run the scan on a fixed interval until `cancel` fires.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut scan_interval = interval(self.scan_interval);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Deadline monitor stopped");
                        break;
                    }
                    _ = scan_interval.tick() => {}
                }

                tracing::info!("Starting scheduled deadline scan");
                if let Err(e) = self
                    .check_and_send_deadline_notifications(self.days_threshold, &cancel)
                    .await
                {
                    tracing::warn!(error = %e, "Deadline scan failed");
                }
            }
        })
    }
}
