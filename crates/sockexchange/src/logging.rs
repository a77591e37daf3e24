//! Tracing subscriber setup for the binary.

use crate::config::LoggingSettings;
use crate::error::ProxyError;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `level`. Output is JSON when either the settings or
/// `json_override` ask for it.
pub fn setup_logging(settings: &LoggingSettings, level: &str, json_override: bool) -> Result<(), ProxyError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json_override || settings.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    };
    result.map_err(|e| ProxyError::Logging(e.to_string()))?;

    info!("🔧 Logging initialized with level: {}", level);
    Ok(())
}
