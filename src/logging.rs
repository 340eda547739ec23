//! # Logging Setup
//!
//! The engine only emits `tracing` events. The host decides whether and how
//! they are collected; `init_tracing` is the default `fmt` subscriber setup for
//! hosts that have none of their own.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is INFO, or DEBUG when
/// `verbose` is true. Returns `false` if a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> bool {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
