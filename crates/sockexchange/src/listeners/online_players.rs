//! Periodic broadcast of the players online on the proxy.
//!
//! Payload: count (int), then `count` player names.

use super::channels;
use super::periodic::PeriodicTask;
use crate::tie_in::ProxyTieIn;
use sockexchange_core::{ExchangeContext, ExchangeError, MessageWriter, Registerable};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Encodes the online player list for the `OnlinePlayerUpdate` channel.
pub fn encode_player_list(players: &[String]) -> Result<Vec<u8>, ExchangeError> {
    let count = i32::try_from(players.len()).map_err(|_| ExchangeError::PayloadTooLarge(players.len()))?;

    let mut writer = MessageWriter::new();
    writer.write_int(count);
    for player in players {
        writer.write_utf(player)?;
    }
    Ok(writer.into_bytes())
}

pub struct OnlinePlayerUpdateSender {
    tie_in: Arc<dyn ProxyTieIn>,
    interval: Duration,
    task: PeriodicTask,
}

impl OnlinePlayerUpdateSender {
    pub fn new(tie_in: Arc<dyn ProxyTieIn>, interval: Duration) -> Self {
        Self {
            tie_in,
            interval,
            task: PeriodicTask::new(),
        }
    }
}

impl Registerable for OnlinePlayerUpdateSender {
    fn register(&self, _context: &ExchangeContext) {
        let tie_in = self.tie_in.clone();
        let started = self.task.start("online player sender", self.interval, move || {
            let players = tie_in.online_player_names();
            match encode_player_list(&players) {
                Ok(payload) => tie_in.send_to_servers(channels::ONLINE_PLAYER_UPDATE, &payload, &[]),
                Err(e) => warn!("⚠️ Could not encode {} online players: {}", players.len(), e),
            }
            async {}
        });
        if started {
            debug!("👥 Online player updates every {:?}", self.interval);
        }
    }

    fn unregister(&self, _context: &ExchangeContext) {
        if self.task.stop() {
            debug!("👥 Online player updates stopped");
        }
    }
}
