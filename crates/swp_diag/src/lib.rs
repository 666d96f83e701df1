//! # swp_diag
//!
//! Error taxonomy and structured-logging setup shared across the platform.
//!
//! This crate provides:
//!
//! - [`SimError`] — the single error type returned by every fallible
//!   operation in the simulation core.
//! - [`init_logging`] — installs the `tracing` subscriber used by the CLI
//!   and by integration tests that want readable output.

pub mod error;
pub mod logging;

pub use error::SimError;
pub use logging::init_logging;
