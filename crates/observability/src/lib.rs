//! Shared tracing/logging setup for the api and worker binaries.

use tracing_subscriber::EnvFilter;

/// Initialize process-wide logging.
///
/// `RUST_LOG` controls the filter (default `info`). `LOG_FORMAT=text`
/// switches the JSON output to human-readable lines for local runs.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let text = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("text"));
    if text {
        let _ = builder.try_init();
    } else {
        let _ = builder.json().try_init();
    }
}
