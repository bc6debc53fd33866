//! Log setup for conformance runs
//!
//! The harness logs through `tracing`. Divergences go out at `info`, and
//! parse failures and infrastructure errors at `warn`. Per-test detail and
//! `print` output from scripts go out at `debug`.

use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `TEST262_LOG=quicksilver_test262=debug`
pub const ENV_LOG: &str = "TEST262_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install a subscriber that writes through the test capture.
///
/// Safe to call from every test: only the first call installs anything.
pub fn init() {
    let filter =
        EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
