// Tracing setup
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// `level` is an env-filter directive, e.g. `info` or `pql_bench=debug,reqwest=warn`.
/// `RUST_LOG` wins when set.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {}", e))?;
    Ok(())
}
