//! Channel listeners and periodic senders built on the coordination core.

pub mod chat;
pub mod keep_alive;
pub mod move_players;
pub mod online_players;
pub mod periodic;
pub mod run_cmd;
pub mod run_cmd_channel;

pub use chat::ChatMessageConsumer;
pub use keep_alive::KeepAliveSender;
pub use move_players::MovePlayersConsumer;
pub use online_players::OnlinePlayerUpdateSender;
pub use run_cmd::{CommandSource, RunCmdCommand};
pub use run_cmd_channel::RunCmdConsumer;

use sockexchange_core::{ExchangeContext, ExchangeError, MessageConsumer, MessageReader, Registerable};
use std::sync::Arc;

/// Channel names shared with the backend servers.
pub mod channels {
    pub const MOVE_PLAYERS: &str = "MovePlayers";
    pub const CHAT_MESSAGE: &str = "ChatMessage";
    pub const RUN_CMD: &str = "RunCmd";
    pub const KEEP_ALIVE: &str = "KeepAlive";
    pub const ONLINE_PLAYER_UPDATE: &str = "OnlinePlayerUpdate";
}

/// Binds a consumer to one channel so it can be registered and unregistered
/// as a unit.
pub struct ChannelListener {
    channel: &'static str,
    consumer: Arc<dyn MessageConsumer>,
}

impl ChannelListener {
    pub fn new(channel: &'static str, consumer: Arc<dyn MessageConsumer>) -> Self {
        Self { channel, consumer }
    }
}

impl Registerable for ChannelListener {
    fn register(&self, context: &ExchangeContext) {
        context.notifier.register(self.channel, self.consumer.clone());
    }

    fn unregister(&self, context: &ExchangeContext) {
        context.notifier.unregister(self.channel, &self.consumer);
    }
}

/// Reads an `i32` count followed by that many strings.
pub(crate) fn read_string_list(input: &mut MessageReader<'_>) -> Result<Vec<String>, ExchangeError> {
    let count = input.read_int()?;
    if count < 0 {
        return Err(ExchangeError::MalformedPayload(format!("negative list length {count}")));
    }

    (0..count).map(|_| input.read_utf()).collect()
}
