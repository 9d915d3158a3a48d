//! Logging infrastructure for the proxy.
//!
//! Structured logs go to stdout so a container supervisor can collect them.
//! Verbosity is controlled by `RUST_LOG` when set; otherwise the default
//! level passed by the caller applies.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global logging subscriber.
///
/// `default_level` is a filter directive such as `"info"` or `"debug"` used
/// when `RUST_LOG` is not set. Must be called at most once per process.
pub fn init_logging(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}
