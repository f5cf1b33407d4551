//! Flowdesk Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration, validation
//! and pure deadline computations shared by every flowdesk component.

pub mod config;
pub mod deadline;
pub mod error;
pub mod models;
pub mod validation;

pub use config::{EngineConfig, LogFormat};
pub use deadline::{days_remaining, deadline_state, is_near_deadline, is_overdue, DeadlineState};
pub use error::{AppError, ErrorMetadata, LogLevel};
