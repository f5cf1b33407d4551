//! Template and status template catalogs

mod statuses;
mod templates;

pub use statuses::StatusCatalog;
pub use templates::TemplateCatalog;
