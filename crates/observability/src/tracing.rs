//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Logging options supplied by the host process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Deployment environment; `"production"` selects JSON output.
    pub environment: String,
    /// Default level directive; `RUST_LOG` overrides it when set.
    pub level: String,
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    if config.environment.eq_ignore_ascii_case("production") {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }

    tracing::debug!(
        environment = %config.environment,
        level = %config.level,
        "tracing initialized"
    );
}
