//! `/runcmdvelocity` proxy command: runs a console command on backend servers.

use super::channels;
use crate::formats::{self, MessageFormatMap};
use crate::tie_in::ProxyTieIn;
use sockexchange_core::{ExchangeError, MessageWriter};
use std::sync::Arc;
use tracing::{info, warn};

pub const COMMAND_NAME: &str = "runcmdvelocity";
pub const COMMAND_ALIASES: [&str; 1] = ["rcvelocity"];
pub const COMMAND_PERMISSION: &str = "SockExchange.Command.RunCmd";
/// Destination that addresses every server
pub const ALL_SERVERS: &str = "ALL";

/// Whoever issued a proxy command.
pub trait CommandSource: Send + Sync {
    fn has_permission(&self, permission: &str) -> bool;

    fn send_message(&self, message: &str);
}

/// Encodes commands for the `RunCmd` channel: count (int) then each command.
pub fn encode_commands(commands: &[String]) -> Result<Vec<u8>, ExchangeError> {
    let count = i32::try_from(commands.len()).map_err(|_| ExchangeError::PayloadTooLarge(commands.len()))?;

    let mut writer = MessageWriter::new();
    writer.write_int(count);
    for command in commands {
        writer.write_utf(command)?;
    }
    Ok(writer.into_bytes())
}

pub struct RunCmdCommand {
    tie_in: Arc<dyn ProxyTieIn>,
    formats: MessageFormatMap,
}

impl RunCmdCommand {
    pub fn new(tie_in: Arc<dyn ProxyTieIn>, formats: MessageFormatMap) -> Self {
        Self { tie_in, formats }
    }

    /// Whether `label` invokes this command.
    pub fn handles(label: &str) -> bool {
        label.eq_ignore_ascii_case(COMMAND_NAME)
            || COMMAND_ALIASES.iter().any(|alias| label.eq_ignore_ascii_case(alias))
    }

    /// Runs the command with arguments `server[,server,..] command...`.
    pub fn execute(&self, source: &dyn CommandSource, args: &[&str]) {
        if !source.has_permission(COMMAND_PERMISSION) {
            source.send_message(&self.formats.format(formats::NO_PERM, &[COMMAND_PERMISSION]));
            return;
        }

        if args.len() < 2 {
            source.send_message(
                &self
                    .formats
                    .format(formats::USAGE, &["/runcmd server[,server,..] command"]),
            );
            source.send_message(&self.formats.format(formats::USAGE, &["/runcmd ALL command"]));
            return;
        }

        let destinations: Vec<&str> = args[0].split(',').collect();
        let command = args[1..].join(" ");

        if destinations
            .iter()
            .any(|destination| destination.eq_ignore_ascii_case(ALL_SERVERS))
        {
            if self.send(&command, &[], source) {
                source.send_message(&self.formats.format(formats::COMMAND_SENT, &[ALL_SERVERS]));
            }
            return;
        }

        let mut targets = Vec::with_capacity(destinations.len());
        for destination in destinations {
            match self.tie_in.server_info(destination) {
                None => source.send_message(&self.formats.format(formats::SERVER_NOT_FOUND, &[destination])),
                Some(server) if !server.online => {
                    source.send_message(&self.formats.format(formats::SERVER_NOT_ONLINE, &[destination]))
                }
                Some(server) => targets.push(server.name),
            }
        }

        // An empty target list would mean every server to the transport
        if targets.is_empty() {
            return;
        }

        if self.send(&command, &targets, source) {
            for target in &targets {
                source.send_message(&self.formats.format(formats::COMMAND_SENT, &[target.as_str()]));
            }
        }
    }

    fn send(&self, command: &str, servers: &[String], source: &dyn CommandSource) -> bool {
        match encode_commands(&[command.to_string()]) {
            Ok(payload) => {
                self.tie_in.send_to_servers(channels::RUN_CMD, &payload, servers);
                info!("📨 Sent command to {}: {}", describe(servers), command);
                true
            }
            Err(e) => {
                warn!("⚠️ Could not encode command: {}", e);
                source.send_message(&format!("Command could not be sent: {e}"));
                false
            }
        }
    }
}

fn describe(servers: &[String]) -> String {
    if servers.is_empty() {
        ALL_SERVERS.to_string()
    } else {
        servers.join(", ")
    }
}
