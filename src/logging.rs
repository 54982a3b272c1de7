//! Subscriber setup for the `tracing` events the engine emits
use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber. `RUST_LOG` takes precedence over
/// `default_filter`. Fails if a global subscriber is already set.
pub fn init(default_filter: &str) -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default_filter.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter)?)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
