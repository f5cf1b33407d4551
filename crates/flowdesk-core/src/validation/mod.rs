//! Validation modules

pub mod templates;

pub use templates::{
    validate_color, validate_not_blank, validate_status_items, validate_step_orders, MAX_STATUS_ITEMS,
    MAX_TEMPLATE_STEPS,
};
