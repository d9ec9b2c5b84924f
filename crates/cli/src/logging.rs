//! Subscriber setup. Logs go to stderr so `status --json` output stays parseable.

use elif_migrate::LoggingConfig;
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        "pretty" => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).compact())
            .try_init()?,
    }

    Ok(())
}
