//! Subscriber construction for binaries and tests.
//!
//! Library code only emits through `tracing` and `log` macros and never
//! installs a subscriber itself. A binary calls [`init`] once; tests and
//! embedders can scope a subscriber with `tracing::subscriber::with_default`.

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Builds a subscriber honouring `RUST_LOG`, falling back to the configured level.
pub fn build_subscriber(config: &LoggingConfig) -> Box<dyn Subscriber + Send + Sync> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},receipts={}", config.level, config.level)));
    let registry = Registry::default().with(filter);

    if config.json {
        Box::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        Box::new(
            registry.with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
        )
    }
}

/// Installs the subscriber process-wide and routes `log` records into it.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(build_subscriber(config))?;
    Ok(())
}
