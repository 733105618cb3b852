//! Tracing subscriber setup for embedding applications

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// Falls back to `default_directive` (e.g. `"info"` or
/// `"agenthub_core=debug"`) when `RUST_LOG` is unset or invalid. Returns
/// `false` if a global subscriber was already installed.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Like [`init`], writing to the test harness's captured output
pub fn init_for_tests() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
