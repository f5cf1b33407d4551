//! Template validation module
//!
//! Structural checks the catalogs run before accepting a definition:
//! - Step orders form the contiguous sequence 1..N
//! - Status items carry exactly one initial item and unique order indexes
//! - Status colours are `#rgb` or `#rrggbb` hex strings
//! - Names and titles are not blank after trimming

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use validator::ValidationError;

use crate::error::AppError;
use crate::models::StatusItemInput;

/// Maximum number of steps in one template
pub const MAX_TEMPLATE_STEPS: usize = 100;

/// Maximum number of items in one status template
pub const MAX_STATUS_ITEMS: usize = 50;

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("static colour regex")
    })
}

/// Validate a status colour for `#[validate(custom(...))]`
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    if color_pattern().is_match(color) {
        Ok(())
    } else {
        let mut err = ValidationError::new("color");
        err.message = Some("Colour must be a hex string like #1a2b3c".into());
        Err(err)
    }
}

/// Reject names and titles that are empty once surrounding whitespace is trimmed.
/// Length checks run on the raw value, so this is what keeps `"   "` from being stored as `""`.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must contain at least one non-whitespace character".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Step orders must be exactly `1..=N` once each, in any input order.
pub fn validate_step_orders(orders: &[i32]) -> Result<(), AppError> {
    if orders.is_empty() {
        return Err(AppError::Validation(
            "Template must have at least one step".to_string(),
        ));
    }
    if orders.len() > MAX_TEMPLATE_STEPS {
        return Err(AppError::Validation(format!(
            "Template may have at most {} steps",
            MAX_TEMPLATE_STEPS
        )));
    }

    let mut sorted = orders.to_vec();
    sorted.sort_unstable();
    for (index, order) in sorted.iter().enumerate() {
        let expected = index as i32 + 1;
        if *order != expected {
            return Err(AppError::Validation(format!(
                "Step orders must be the contiguous sequence 1..{} (found {:?})",
                orders.len(),
                sorted
            )));
        }
    }
    Ok(())
}

pub fn validate_status_items(items: &[StatusItemInput]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::Validation(
            "Status template must have at least one item".to_string(),
        ));
    }
    if items.len() > MAX_STATUS_ITEMS {
        return Err(AppError::Validation(format!(
            "Status template may have at most {} items",
            MAX_STATUS_ITEMS
        )));
    }

    let initial = items.iter().filter(|i| i.is_initial).count();
    if initial != 1 {
        return Err(AppError::Validation(format!(
            "Status template must have exactly one initial item (found {})",
            initial
        )));
    }

    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.order_index) {
            return Err(AppError::Validation(format!(
                "Duplicate status order index {}",
                item.order_index
            )));
        }
    }
    Ok(())
}
