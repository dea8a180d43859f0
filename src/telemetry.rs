use anyhow::{Result, anyhow};

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
/// Fails if a global subscriber is already set.
pub fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
