//! Flowdesk Services Layer
//!
//! The workflow engine proper: template and status catalogs, the workflow state
//! machine, assignment tracking, the transition ledger, deadline scanning,
//! notifications and dashboard stats. Everything runs against the repository traits
//! of `flowdesk-db` through [`EngineStore`].

pub mod assignments;
pub mod catalog;
pub mod collaborators;
pub mod deadline;
pub mod engine;
pub mod ledger;
pub mod notifications;
pub mod setup;
pub mod stats;
pub mod store;

pub use assignments::{AssignmentTracker, Reassignment};
pub use catalog::{StatusCatalog, TemplateCatalog};
pub use collaborators::{DirectoryService, Permission, StaticDirectory, TeamRegistry, UserProfile};
pub use deadline::{DeadlineMonitor, DeadlineScanReport};
pub use engine::WorkflowEngine;
pub use ledger::{TransitionBuilder, TransitionLedger};
pub use notifications::{NotificationDispatcher, DEFAULT_INBOX_LIMIT};
pub use setup::{initialize_services, FlowdeskServices};
pub use stats::StatsAggregator;
pub use store::EngineStore;
