//!
//! Tracing initialisation.
//!
//! `RUST_LOG` wins when set. Otherwise the `[logging]` section of the config
//! decides, unless an explicit filter is passed on the command line.
//!

use tracing_subscriber::EnvFilter;

use crate::config::LoggingToml;

/// Build the filter from an explicit directive string or the config file.
pub fn env_filter(config: &LoggingToml, cli_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = cli_filter {
        return EnvFilter::new(filter);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new("");
        filter = filter.add_directive(config.level.to_owned().into());
        for target_level in &config.module_levels {
            filter = filter.add_directive(target_level.to_owned().into());
        }
        filter
    })
}

/// Initialize the global tracing subscriber, logging to stderr.
pub fn init_tracing_logs(config: &LoggingToml, cli_filter: Option<&str>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config, cli_filter))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    Ok(())
}
