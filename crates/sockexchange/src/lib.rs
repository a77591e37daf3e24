//! # SockExchange
//!
//! Proxy side of SockExchange. Backend servers publish channel-tagged messages
//! to the proxy and answer its requests; this crate routes those messages to
//! the proxy features that handle them and runs the proxy-originated ones.
//!
//! The host proxy is abstracted behind [`ProxyTieIn`]. Start everything with
//! [`SockExchangePlugin::initialize`] and hand the returned [`ExchangeApi`] to
//! the transport and to any code that wants to send requests.

pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod listeners;
pub mod logging;
pub mod plugin;
pub mod signals;
pub mod tie_in;

pub use config::AppConfig;
pub use error::ProxyError;
pub use formats::MessageFormatMap;
pub use listeners::{channels, CommandSource};
pub use plugin::{ExchangeApi, ShutdownReport, SockExchangePlugin};
pub use tie_in::{ProxyTieIn, ServerInfo};
