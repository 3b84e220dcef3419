//! Logging setup for the binary.
//!
//! Everything goes to stdout, one line per event, filtered by `RUST_LOG`
//! (default `info`). Per-tile completion events use the `tilegen::tile`
//! target, so `RUST_LOG=info,tilegen::tile=off` keeps only progress and
//! summaries.

use std::io;
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging() -> Result<(), TryInitError> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_thread_names(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .try_init()
}
