//! Data models for the workflow engine
//!
//! Each sub-module covers one record family: templates, status templates,
//! workflow instances, assignments, transitions, notifications and stats projections.

mod assignment;
mod notification;
mod stats;
mod status_template;
mod template;
mod transition;
mod workflow;

pub use assignment::*;
pub use notification::*;
pub use stats::*;
pub use status_template::*;
pub use template::*;
pub use transition::*;
pub use workflow::*;
