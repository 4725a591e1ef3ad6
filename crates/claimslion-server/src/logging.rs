//! Subscriber setup for the server binary.
//!
//! The library logs through both `log` and `tracing`; `LogTracer` forwards
//! the former into the subscriber installed here.

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use claimslion::config::LogFormat;

use crate::error::ServerError;

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(format: LogFormat) -> Result<(), ServerError> {
    LogTracer::init().map_err(|e| ServerError::Logging(e.to_string()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = Registry::default().with(filter);

    let result = match format {
        LogFormat::Text => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    };
    result.map_err(|e| ServerError::Logging(e.to_string()))
}
