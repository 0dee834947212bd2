//! Tracing subscriber setup for the binary

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// `RUST_LOG` when set, otherwise the configured `loglevel`
pub fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Install the global fmt subscriber. Logs go to stderr so replies on
/// stdout stay clean. A second call is a no-op.
pub fn init(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));
}
