//! Process-wide tracing setup for embedders of the PEX subsystem.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the configured level;
/// `verbose` forces `trace`. Fails if a subscriber is already installed.
pub fn setup_logging(
    config: &LoggingConfig,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose { "trace" } else { &config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // journald already stamps time and host
    let is_systemd =
        std::env::var("JOURNAL_STREAM").is_ok() || std::env::var("INVOCATION_ID").is_ok();

    match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(false)
            .try_init(),
        _ if is_systemd => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .without_time()
            .compact()
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .compact()
            .try_init(),
    }
}
