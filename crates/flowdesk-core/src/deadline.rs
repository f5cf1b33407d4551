//! Deadline computations. Pure functions of a workflow and an instant; nothing is stored.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::Workflow;

const SECONDS_PER_DAY: i64 = 86_400;

/// `deadline != null && now > deadline && lifecycle is open`
pub fn is_overdue(workflow: &Workflow, now: DateTime<Utc>) -> bool {
    match workflow.deadline {
        Some(deadline) => now > deadline && workflow.lifecycle_status.is_open(),
        None => false,
    }
}

/// Open, not overdue, and the deadline falls within `days_threshold` days of `now`.
pub fn is_near_deadline(workflow: &Workflow, days_threshold: i64, now: DateTime<Utc>) -> bool {
    let Some(deadline) = workflow.deadline else {
        return false;
    };
    if !workflow.lifecycle_status.is_open() || is_overdue(workflow, now) {
        return false;
    }
    deadline - now <= Duration::days(days_threshold)
}

/// Whole days left, rounded up; 0 once the deadline has passed. `None` without a deadline.
pub fn days_remaining(workflow: &Workflow, now: DateTime<Utc>) -> Option<i64> {
    let deadline = workflow.deadline?;
    let seconds = (deadline - now).num_seconds();
    if seconds <= 0 {
        return Some(0);
    }
    Some((seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeadlineState {
    pub is_overdue: bool,
    pub is_near_deadline: bool,
    pub days_remaining: Option<i64>,
}

pub fn deadline_state(workflow: &Workflow, days_threshold: i64, now: DateTime<Utc>) -> DeadlineState {
    DeadlineState {
        is_overdue: is_overdue(workflow, now),
        is_near_deadline: is_near_deadline(workflow, days_threshold, now),
        days_remaining: days_remaining(workflow, now),
    }
}
