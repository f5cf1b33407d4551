//! PostgreSQL repositories

mod notification;
mod status_template;
mod template;
mod workflow;

pub use notification::PostgresNotificationRepository;
pub use status_template::PostgresStatusTemplateRepository;
pub use template::PostgresTemplateRepository;
pub use workflow::PostgresWorkflowRepository;
