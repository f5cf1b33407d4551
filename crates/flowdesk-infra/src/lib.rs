//! Flowdesk Infrastructure Library
//!
//! Shared infrastructure used by the engine and the CLI:
//! - Telemetry initialization (tracing subscriber, pretty or JSON output)
//! - Per-key async locks serialising mutations of one workflow

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "locks")]
pub mod locks;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};

#[cfg(feature = "locks")]
pub use locks::{KeyedLocks, KeyGuard};
