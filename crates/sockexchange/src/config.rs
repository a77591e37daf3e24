//! Configuration management for the SockExchange proxy.
//!
//! Settings are loaded from a TOML file, overridden from the command line and
//! validated before anything is started. Every field has a default so a
//! partial file is enough.

use crate::error::ProxyError;
use crate::formats::MessageFormatMap;
use serde::{Deserialize, Serialize};
use sockexchange_core::ExecutorConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub executor: ExecutorSettings,
    pub registry: RegistrySettings,
    pub keep_alive: KeepAliveSettings,
    pub online_players: OnlinePlayersSettings,
    /// Named message templates with `{0}`, `{1}` ... placeholders
    pub formats: BTreeMap<String, String>,
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            executor: ExecutorSettings::default(),
            registry: RegistrySettings::default(),
            keep_alive: KeepAliveSettings::default(),
            online_players: OnlinePlayersSettings::default(),
            formats: MessageFormatMap::default_templates(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Listener and backend-facing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port backend servers connect to
    pub port: u16,
    /// Threads reserved for accepting backend connections
    pub connection_threads: usize,
    /// Shared secret backend servers present when registering
    pub registration_password: String,
    /// Servers hidden from player-facing listings, matched case-insensitively
    pub private_servers: Vec<String>,
    /// Forces debug logging
    pub debug_mode: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 20000,
            connection_threads: 4,
            registration_password: String::new(),
            private_servers: Vec::new(),
            debug_mode: false,
        }
    }
}

/// Worker pool sizing and shutdown timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Runtime worker threads
    pub core_workers: usize,
    /// Tasks allowed to run at the same time
    pub max_workers: usize,
    /// Bound for each of the two shutdown waits
    pub shutdown_timeout_secs: u64,
    /// Polls made while draining before shutdown
    pub drain_attempts: u32,
    /// Delay between drain polls
    pub drain_interval_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            core_workers: 2,
            max_workers: 8,
            shutdown_timeout_secs: 60,
            drain_attempts: 10,
            drain_interval_ms: 1000,
        }
    }
}

impl ExecutorSettings {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_workers: self.max_workers,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Response timeout handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Fixed delay between timeout sweeps
    pub sweep_interval_ms: u64,
    /// Timeout used by requests that do not pick their own
    pub default_timeout_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 5000,
            default_timeout_ms: 10_000,
        }
    }
}

impl RegistrySettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveSettings {
    pub interval_ms: u64,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl KeepAliveSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How often the online player list is broadcast to backend servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlinePlayersSettings {
    pub interval_ms: u64,
}

impl Default for OnlinePlayersSettings {
    fn default() -> Self {
        Self { interval_ms: 5000 }
    }
}

impl OnlinePlayersSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, ProxyError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.server.port == 0 {
            return Err(ProxyError::InvalidConfig("server.port must not be 0".to_string()));
        }

        if self.executor.core_workers == 0 {
            return Err(ProxyError::InvalidConfig(
                "executor.core_workers must be at least 1".to_string(),
            ));
        }

        if self.executor.max_workers < self.executor.core_workers {
            return Err(ProxyError::InvalidConfig(format!(
                "executor.max_workers ({}) must not be below executor.core_workers ({})",
                self.executor.max_workers, self.executor.core_workers
            )));
        }

        if self.executor.drain_interval_ms == 0 {
            return Err(ProxyError::InvalidConfig(
                "executor.drain_interval_ms must not be 0".to_string(),
            ));
        }

        if self.registry.sweep_interval_ms == 0 {
            return Err(ProxyError::InvalidConfig(
                "registry.sweep_interval_ms must not be 0".to_string(),
            ));
        }

        if self.keep_alive.interval_ms == 0 {
            return Err(ProxyError::InvalidConfig(
                "keep_alive.interval_ms must not be 0".to_string(),
            ));
        }

        if self.online_players.interval_ms == 0 {
            return Err(ProxyError::InvalidConfig(
                "online_players.interval_ms must not be 0".to_string(),
            ));
        }

        if self.server.connection_threads == 0 {
            return Err(ProxyError::InvalidConfig(
                "server.connection_threads must be at least 1".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ProxyError::InvalidConfig(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, VALID_LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// Logs settings that are legal but probably not what the operator meant.
    ///
    /// Call after logging is initialized.
    pub fn warn_questionable(&self) {
        if self.registry.default_timeout_ms < self.registry.sweep_interval_ms {
            warn!(
                "⚠️ Default request timeout {}ms is shorter than the sweep interval {}ms; timeouts may be reported up to {}ms late",
                self.registry.default_timeout_ms,
                self.registry.sweep_interval_ms,
                self.registry.sweep_interval_ms
            );
        }
    }

    /// Built-in format templates overlaid with the configured ones.
    pub fn format_map(&self) -> MessageFormatMap {
        let mut formats = MessageFormatMap::with_defaults();
        for (name, template) in &self.formats {
            formats.insert(name.clone(), template.clone());
        }
        formats
    }

    /// Whether a registering backend presented the configured password.
    pub fn does_registration_password_match(&self, password: &str) -> bool {
        self.server.registration_password == password
    }

    /// Whether `server` is listed as private, ignoring case.
    pub fn is_private_server(&self, server: &str) -> bool {
        self.server
            .private_servers
            .iter()
            .any(|name| name.eq_ignore_ascii_case(server))
    }

    /// Effective log filter: `debug` when debug mode is on.
    pub fn effective_log_level(&self) -> &str {
        if self.server.debug_mode {
            "debug"
        } else {
            &self.logging.level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.server.port, 20000);
        assert_eq!(config.server.connection_threads, 4);
        assert_eq!(config.executor.core_workers, 2);
        assert_eq!(config.executor.max_workers, 8);
        assert_eq!(config.executor.shutdown_timeout_secs, 60);
        assert_eq!(config.registry.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.keep_alive.interval(), Duration::from_secs(2));
        assert_eq!(config.online_players.interval(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.executor.max_workers = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.executor.core_workers = 0;
        config.executor.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.registry.sweep_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.online_players.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.connection_threads = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(config.validate(), Err(ProxyError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[server]
port = 25577
private_servers = ["Staging"]

[formats]
NoPerm = "Missing {0}"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 25577);
        assert_eq!(config.server.connection_threads, 4);
        assert_eq!(config.executor.max_workers, 8);
        assert!(config.is_private_server("staging"));
        assert!(!config.is_private_server("lobby"));
        assert_eq!(config.format_map().format("NoPerm", &["x.y"]), "Missing x.y");
        // Formats not overridden keep their built-in template
        assert!(config.format_map().contains("Usage"));
    }

    #[test]
    fn test_registration_password_is_exact() {
        let mut config = AppConfig::default();
        config.server.registration_password = "s3cret".to_string();

        assert!(config.does_registration_password_match("s3cret"));
        assert!(!config.does_registration_password_match("S3CRET"));
        assert!(!config.does_registration_password_match(""));
    }

    #[test]
    fn test_debug_mode_forces_debug_level() {
        let mut config = AppConfig::default();
        assert_eq!(config.effective_log_level(), "info");
        config.server.debug_mode = true;
        assert_eq!(config.effective_log_level(), "debug");
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sockexchange.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.port, 20000);
        assert!(path.exists());

        // The written file loads back to the same settings
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.registry.default_timeout_ms, config.registry.default_timeout_ms);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[server\nport = ").await.unwrap();

        let result = AppConfig::load_from_file(&path).await;
        assert!(matches!(result, Err(ProxyError::ConfigParse(_))));
    }
}
