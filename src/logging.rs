//! Tracing initialization.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter (e.g., "info", "debug", "trace")
    pub level: String,
    /// Enable JSON formatting for structured logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Initializes the global tracing subscriber. `RUST_LOG` takes precedence
/// over the configured level. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true);
        Registry::default().with(filter).with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer().with_target(true);
        Registry::default().with(filter).with(fmt_layer).try_init()?;
    }

    tracing::info!(version = crate::version_string(), "logging initialized");
    Ok(())
}
