use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "RELEASE_PACK_LOG";
pub const DEFAULT_FILTER: &str = "info";

/// Resolve the logging filter to use for the subscriber.
pub fn resolve_env_filter() -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string())
}

/// Install a stderr log subscriber with the given filter directives.
pub fn install(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))
}
