//! Moves players between backend servers on request from a backend.
//!
//! Payload: target server (string), count (int), then `count` player names.

use super::{channels, read_string_list, ChannelListener};
use crate::tie_in::ProxyTieIn;
use async_trait::async_trait;
use sockexchange_core::{ExchangeError, MessageConsumer, ReceivedMessage};
use std::sync::Arc;
use tracing::debug;

pub struct MovePlayersConsumer {
    tie_in: Arc<dyn ProxyTieIn>,
}

impl MovePlayersConsumer {
    pub fn new(tie_in: Arc<dyn ProxyTieIn>) -> Self {
        Self { tie_in }
    }

    /// Wraps a new consumer in a listener bound to the `MovePlayers` channel.
    pub fn listener(tie_in: Arc<dyn ProxyTieIn>) -> ChannelListener {
        ChannelListener::new(channels::MOVE_PLAYERS, Arc::new(Self::new(tie_in)))
    }
}

#[async_trait]
impl MessageConsumer for MovePlayersConsumer {
    async fn accept(&self, message: ReceivedMessage) -> Result<(), ExchangeError> {
        let mut input = message.data_input();
        let server = input.read_utf()?;
        let players = read_string_list(&mut input)?;

        if self.tie_in.server_info(&server).is_none() {
            debug!("Move request from {} names unknown server {}", message.server_name(), server);
            return Ok(());
        }

        for player in &players {
            if self.tie_in.server_name_for_player(player).is_none() {
                continue;
            }

            if self.tie_in.connect_player(player, &server) {
                debug!("🚚 Moving {} to {}", player, server);
            }
        }
        Ok(())
    }

    fn consumer_name(&self) -> &str {
        "move_players"
    }
}
