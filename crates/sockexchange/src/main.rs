//! Standalone SockExchange process.
//!
//! Runs the coordination core and every proxy feature against a tie-in that
//! only logs what it would do. Useful for checking configuration and watching
//! the lifecycle without a proxy attached.

use anyhow::Context;
use sockexchange::cli::CliArgs;
use sockexchange::logging::setup_logging;
use sockexchange::signals::wait_for_shutdown_signal;
use sockexchange::{AppConfig, ProxyTieIn, ServerInfo, SockExchangePlugin};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Tie-in with no proxy behind it: knows no servers or players and logs
/// outbound traffic.
struct LoggingTieIn;

impl ProxyTieIn for LoggingTieIn {
    fn server_info(&self, _name: &str) -> Option<ServerInfo> {
        None
    }

    fn server_infos(&self) -> Vec<ServerInfo> {
        Vec::new()
    }

    fn server_name_for_player(&self, _player: &str) -> Option<String> {
        None
    }

    fn connect_player(&self, player: &str, server: &str) -> bool {
        info!("🚚 Would move {} to {}", player, server);
        false
    }

    fn online_player_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn run_console_command(&self, command: &str) -> bool {
        info!("⌨️ Would run console command: {}", command);
        false
    }

    fn send_chat_messages_to_player(&self, player: &str, messages: &[String]) {
        for message in messages {
            info!("💬 [{}] {}", player, message);
        }
    }

    fn send_chat_messages_to_console(&self, messages: &[String]) {
        for message in messages {
            info!("💬 [console] {}", message);
        }
    }

    fn send_to_servers(&self, channel: &str, payload: &[u8], servers: &[String]) {
        debug!(
            "📤 {} ({} bytes) to {}",
            channel,
            payload.len(),
            if servers.is_empty() { "all servers".to_string() } else { servers.join(", ") }
        );
    }

    fn send_request(&self, channel: &str, payload: &[u8], server: &str, correlation_id: u64) {
        debug!(
            "📤 Request #{} {} ({} bytes) to {}",
            correlation_id,
            channel,
            payload.len(),
            server
        );
    }
}

fn load_config(args: &CliArgs) -> anyhow::Result<AppConfig> {
    // The worker count is needed before the main runtime exists
    let bootstrap = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build bootstrap runtime")?;
    let mut config = bootstrap
        .block_on(AppConfig::load_from_file(&args.config_path))
        .with_context(|| format!("failed to load {}", args.config_path.display()))?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if args.debug {
        config.server.debug_mode = true;
    }

    config.validate().context("configuration validation failed")?;
    Ok(config)
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        "🌐 Backend port {} with {} connection threads (registration password {})",
        config.server.port,
        config.server.connection_threads,
        if config.server.registration_password.is_empty() { "not set" } else { "set" }
    );

    let plugin = SockExchangePlugin::initialize(config, Arc::new(LoggingTieIn))?;
    info!("✅ SockExchange is running, press Ctrl+C to stop");

    wait_for_shutdown_signal()
        .await
        .context("failed to install signal handlers")?;
    info!("🛑 Shutdown signal received, initiating graceful shutdown...");

    let report = plugin.shutdown().await;
    info!("📊 Final statistics: {}", serde_json::to_string(&report.stats)?);
    if !report.executor.is_clean() {
        error!("❌ Shutdown abandoned running work: {:?}", report.executor);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = load_config(&args)?;

    setup_logging(&config.logging, config.effective_log_level(), args.json_logs)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.executor.core_workers)
        .thread_name("sockexchange-worker")
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(run(config))
}
