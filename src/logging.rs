//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `CERTNEST_LOG=certnest=debug`.
pub const LOG_ENV: &str = "CERTNEST_LOG";

/// Install a stderr subscriber; defaults to warnings only. Safe to call twice.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
