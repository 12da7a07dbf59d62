//! Database module for the migration runner
//!
//! This module handles connection strings, host resolution, diagnostics and
//! execution of the migration through the database client.

pub mod connection;
pub mod diagnostics;
pub mod executor;
pub mod migrations;
pub mod resolver;

// Re-export key types
pub use connection::ConnectionSpec;
pub use executor::{AttemptResult, CommandRunner, ConnectMethod, ProcessRunner};
pub use migrations::{MigrationExecutor, Sleeper, TokioSleeper};
pub use resolver::{Resolve, SystemResolver};
