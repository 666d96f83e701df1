//! Structured logging setup, shared by the CLI and integration tests.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber filtered by `RUST_LOG`
/// (defaulting to `info` for this crate family if unset).
///
/// Safe to call more than once; subsequent calls are no-ops (the global
/// subscriber can only be set once per process).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
