//! Utilities for the migration runner
//!
//! This module provides logging setup and secret masking.

pub mod logging;
pub mod redact;

pub use redact::Redactor;
