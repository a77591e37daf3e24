//! # Plugin Lifecycle
//!
//! Wires the coordination core to a host proxy: builds the executor, notifier
//! and registry, starts the timeout sweep, registers every listener and sender,
//! and takes it all down again in a fixed order on shutdown.

use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::listeners::run_cmd::{encode_commands, RunCmdCommand};
use crate::listeners::{
    channels, ChatMessageConsumer, CommandSource, KeepAliveSender, MovePlayersConsumer, OnlinePlayerUpdateSender,
    RunCmdConsumer,
};
use crate::tie_in::{ProxyTieIn, ServerInfo};
use serde::Serialize;
use sockexchange_core::{
    ExchangeContext, ExchangeStats, Registerable, ReceivedMessage, ResponseMessage, ResponseStatus,
    ShutdownOutcome, TaskExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened during [`SockExchangePlugin::shutdown`].
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Whether in-flight work finished during the drain phase
    pub drained: bool,
    pub executor: ShutdownOutcome,
    /// Pending expectations dropped without a callback
    pub dropped_expectations: usize,
    pub stats: ExchangeStats,
}

/// Cloneable handle other proxy code uses to talk to backend servers.
#[derive(Clone)]
pub struct ExchangeApi {
    context: ExchangeContext,
    tie_in: Arc<dyn ProxyTieIn>,
    config: Arc<AppConfig>,
    run_cmd: Arc<RunCmdCommand>,
}

impl std::fmt::Debug for ExchangeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeApi")
            .field("context", &self.context)
            .finish()
    }
}

impl ExchangeApi {
    pub fn context(&self) -> &ExchangeContext {
        &self.context
    }

    pub fn tie_in(&self) -> &Arc<dyn ProxyTieIn> {
        &self.tie_in
    }

    /// Looks up a server, marking it private when the configuration says so.
    pub fn server_info(&self, name: &str) -> Option<ServerInfo> {
        self.tie_in.server_info(name).map(|mut info| {
            info.private |= self.config.is_private_server(&info.name);
            info
        })
    }

    /// All servers, with private flags applied from the configuration.
    pub fn server_infos(&self) -> Vec<ServerInfo> {
        self.tie_in
            .server_infos()
            .into_iter()
            .map(|mut info| {
                info.private |= self.config.is_private_server(&info.name);
                info
            })
            .collect()
    }

    /// Checks the password a backend server presents when it registers.
    pub fn does_registration_password_match(&self, password: &str) -> bool {
        self.config.does_registration_password_match(password)
    }

    /// Sends a fire-and-forget message; an empty `servers` means all servers.
    pub fn send_to_servers(&self, channel: &str, payload: &[u8], servers: &[String]) {
        self.tie_in.send_to_servers(channel, payload, servers);
    }

    /// Sends console commands to the named servers, or to all servers when
    /// `servers` is empty.
    pub fn send_commands_to_servers(&self, commands: &[String], servers: &[String]) -> Result<(), ProxyError> {
        let payload = encode_commands(commands)?;
        self.tie_in.send_to_servers(channels::RUN_CMD, &payload, servers);
        Ok(())
    }

    /// Sends a request to one server and arranges for `callback` to receive
    /// exactly one response: the reply, or a synthesized status when the
    /// server is unknown, offline or too slow.
    ///
    /// `timeout` falls back to the configured default. Returns the correlation
    /// id.
    pub fn send_request<F>(
        &self,
        channel: &str,
        payload: &[u8],
        server: &str,
        timeout: Option<Duration>,
        callback: F,
    ) -> u64
    where
        F: FnOnce(ResponseMessage) + Send + 'static,
    {
        let timeout = timeout.unwrap_or_else(|| self.config.registry.default_timeout());
        let registry = &self.context.registry;
        let id = registry.new_expectation(timeout, callback);

        // Undeliverable requests still resolve through the registry so the
        // callback runs exactly once
        match self.tie_in.server_info(server) {
            None => {
                registry.resolve(id, ResponseMessage::new(ResponseStatus::ServerNotFound));
            }
            Some(info) if !info.online => {
                registry.resolve(id, ResponseMessage::new(ResponseStatus::ServerOffline));
            }
            Some(info) => {
                debug!("📨 Request #{} on {} to {}", id, channel, info.name);
                self.tie_in.send_request(channel, payload, &info.name, id);
            }
        }
        id
    }

    /// Awaitable form of [`ExchangeApi::send_request`].
    ///
    /// Resolves to a cancelled response if the plugin shuts down before an
    /// outcome arrives.
    pub async fn request(
        &self,
        channel: &str,
        payload: &[u8],
        server: &str,
        timeout: Option<Duration>,
    ) -> ResponseMessage {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send_request(channel, payload, server, timeout, move |response| {
            let _ = tx.send(response);
        });
        rx.await.unwrap_or_else(|_| ResponseMessage::cancelled())
    }

    /// Transport entry point for a framed inbound message.
    pub fn handle_message(&self, server: &str, channel: &str, payload: Vec<u8>) -> usize {
        self.context
            .notifier
            .notify(ReceivedMessage::new(channel, server, payload))
    }

    /// Transport entry point for a reply carrying correlation id `id`.
    ///
    /// Returns whether a pending request was resolved.
    pub fn handle_response(&self, id: u64, encoded: &[u8]) -> Result<bool, ProxyError> {
        let response = ResponseMessage::decode(encoded)?;
        Ok(self.context.registry.resolve(id, response))
    }

    /// Runs a proxy command if `label` names one of ours.
    ///
    /// Returns `false` when the label is not handled here.
    pub fn dispatch_command(&self, label: &str, source: &dyn CommandSource, args: &[&str]) -> bool {
        if !RunCmdCommand::handles(label) {
            return false;
        }
        self.run_cmd.execute(source, args);
        true
    }

    pub fn stats(&self) -> ExchangeStats {
        self.context.stats()
    }
}

/// A running SockExchange instance.
pub struct SockExchangePlugin {
    config: Arc<AppConfig>,
    api: ExchangeApi,
    components: Vec<Box<dyn Registerable>>,
    sweeper: Option<JoinHandle<()>>,
}

impl SockExchangePlugin {
    /// Builds and starts everything on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or when called outside a runtime.
    pub fn initialize(config: AppConfig, tie_in: Arc<dyn ProxyTieIn>) -> Result<Self, ProxyError> {
        config.validate()?;
        config.warn_questionable();

        let runtime = Handle::try_current().map_err(|e| ProxyError::Runtime(e.to_string()))?;
        let config = Arc::new(config);
        let executor = Arc::new(TaskExecutor::with_handle(
            runtime,
            config.executor.executor_config(),
        ));
        let context = ExchangeContext::with_executor(executor);

        let sweeper = context
            .registry
            .spawn_sweeper(config.registry.sweep_interval());

        let components: Vec<Box<dyn Registerable>> = vec![
            Box::new(ChatMessageConsumer::listener(tie_in.clone())),
            Box::new(MovePlayersConsumer::listener(tie_in.clone())),
            Box::new(RunCmdConsumer::listener(tie_in.clone())),
            Box::new(KeepAliveSender::new(tie_in.clone(), config.keep_alive.interval())),
            Box::new(OnlinePlayerUpdateSender::new(
                tie_in.clone(),
                config.online_players.interval(),
            )),
        ];
        for component in &components {
            component.register(&context);
        }

        let run_cmd = Arc::new(RunCmdCommand::new(tie_in.clone(), config.format_map()));
        let api = ExchangeApi {
            context,
            tie_in,
            config: config.clone(),
            run_cmd,
        };

        info!(
            "🚀 SockExchange started: {} max workers, sweep every {}ms, channels {:?}",
            config.executor.max_workers,
            config.registry.sweep_interval_ms,
            api.context.notifier.channels()
        );

        Ok(Self {
            config,
            api,
            components,
            sweeper: Some(sweeper),
        })
    }

    /// Handle for the rest of the proxy.
    pub fn api(&self) -> ExchangeApi {
        self.api.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Stops intake, drains, shuts the executor down, detaches listeners,
    /// stops the sweep and drops whatever is still pending, in that order.
    pub async fn shutdown(mut self) -> ShutdownReport {
        let context = self.api.context.clone();
        info!("🛑 SockExchange shutting down");

        context.executor.set_accepting_tasks(false);
        let drained = context
            .executor
            .await_drain(self.config.executor.drain_attempts, self.config.executor.drain_interval())
            .await;
        if !drained {
            warn!("⚠️ Drain incomplete, forcing executor shutdown");
        }

        let executor = context.executor.shutdown().await;

        for component in &self.components {
            component.unregister(&context);
        }

        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }

        let dropped_expectations = context.registry.len();
        context.registry.clear();

        let report = ShutdownReport {
            drained,
            executor,
            dropped_expectations,
            stats: context.stats(),
        };
        info!("✅ SockExchange stopped ({:?})", report.executor);
        report
    }
}
