//! Logging setup for the binary.
//!
//! Library code logs through the `log` macros and opens `tracing` spans.
//! [`init_logging`] installs one `tracing-subscriber` registry for both and
//! bridges `log` records into it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::schema::LoggingConfig;
use crate::error::TelemetryError;

/// `RUST_LOG` wins over the configured level when set.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let json = config.json;
    let subscriber = Registry::default()
        .with(env_filter(config))
        .with(json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!json).then(|| fmt::layer().with_target(true)));

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}
