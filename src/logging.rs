//! Logging initialization.
//!
//! The engine emits `tracing` events and spans; embedding applications
//! install whatever subscriber they like. These helpers cover the common
//! case of a formatted subscriber filtered through `RUST_LOG`.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global fmt subscriber.
///
/// Reads the filter from `RUST_LOG` (e.g. `RUST_LOG=project_allocation=debug`),
/// falling back to `info`.
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();
}

/// Installs a debug-level subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call takes effect.
pub fn init_test() {
    // a subscriber installed by an earlier test stays in place
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
