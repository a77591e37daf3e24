//! Runs console commands on the proxy at the request of a backend server.
//!
//! Payload: count (int), then `count` commands, the same layout the proxy
//! uses when sending commands out.

use super::{channels, read_string_list, ChannelListener};
use crate::tie_in::ProxyTieIn;
use async_trait::async_trait;
use sockexchange_core::{ExchangeError, MessageConsumer, ReceivedMessage};
use std::sync::Arc;
use tracing::info;

pub struct RunCmdConsumer {
    tie_in: Arc<dyn ProxyTieIn>,
}

impl RunCmdConsumer {
    pub fn new(tie_in: Arc<dyn ProxyTieIn>) -> Self {
        Self { tie_in }
    }

    pub fn listener(tie_in: Arc<dyn ProxyTieIn>) -> ChannelListener {
        ChannelListener::new(channels::RUN_CMD, Arc::new(Self::new(tie_in)))
    }
}

#[async_trait]
impl MessageConsumer for RunCmdConsumer {
    async fn accept(&self, message: ReceivedMessage) -> Result<(), ExchangeError> {
        let commands = read_string_list(&mut message.data_input())?;

        let mut failed = Vec::new();
        for command in &commands {
            info!("⌨️ Running command from {}: {}", message.server_name(), command);
            if !self.tie_in.run_console_command(command) {
                failed.push(command.as_str());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ExchangeError::ConsumerFailed(format!(
                "{} of {} commands from {} failed: {}",
                failed.len(),
                commands.len(),
                message.server_name(),
                failed.join("; ")
            )))
        }
    }

    fn consumer_name(&self) -> &str {
        "run_cmd"
    }
}
