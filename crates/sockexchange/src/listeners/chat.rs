//! Relays chat lines from a backend to a player or the proxy console.
//!
//! Payload: target player (string, empty for the console), count (int), then
//! `count` messages.

use super::{channels, read_string_list, ChannelListener};
use crate::tie_in::ProxyTieIn;
use async_trait::async_trait;
use sockexchange_core::{ExchangeError, MessageConsumer, ReceivedMessage};
use std::sync::Arc;

pub struct ChatMessageConsumer {
    tie_in: Arc<dyn ProxyTieIn>,
}

impl ChatMessageConsumer {
    pub fn new(tie_in: Arc<dyn ProxyTieIn>) -> Self {
        Self { tie_in }
    }

    pub fn listener(tie_in: Arc<dyn ProxyTieIn>) -> ChannelListener {
        ChannelListener::new(channels::CHAT_MESSAGE, Arc::new(Self::new(tie_in)))
    }
}

#[async_trait]
impl MessageConsumer for ChatMessageConsumer {
    async fn accept(&self, message: ReceivedMessage) -> Result<(), ExchangeError> {
        let mut input = message.data_input();
        let player = input.read_utf()?;
        let messages = read_string_list(&mut input)?;

        if messages.is_empty() {
            return Ok(());
        }

        if player.is_empty() {
            self.tie_in.send_chat_messages_to_console(&messages);
        } else {
            self.tie_in.send_chat_messages_to_player(&player, &messages);
        }
        Ok(())
    }

    fn consumer_name(&self) -> &str {
        "chat_message"
    }
}
