//! Error types for the proxy side.

use sockexchange_core::ExchangeError;

/// Errors raised while configuring, starting or driving the proxy plugin.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Configuration I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error("No Tokio runtime available: {0}")]
    Runtime(String),
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}
