//! Telemetry initialization
//!
//! Installs the global `tracing` subscriber used by the CLI and long-running scanners.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry};
