//! The slice of the host proxy that SockExchange features need.
//!
//! The plugin never talks to the proxy or the backend connections directly;
//! everything goes through a [`ProxyTieIn`] supplied by the host. Tests supply
//! a recording implementation.

use serde::{Deserialize, Serialize};

/// What the proxy knows about one backend server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    /// Whether the server currently holds a SockExchange connection
    pub online: bool,
    /// Hidden from player-facing listings
    pub private: bool,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, online: bool, private: bool) -> Self {
        Self {
            name: name.into(),
            online,
            private,
        }
    }
}

/// Host proxy operations used by listeners, commands and senders.
///
/// Implementations must be cheap to call from any thread; they are invoked
/// from executor tasks.
pub trait ProxyTieIn: Send + Sync {
    /// Looks up a backend server by name, ignoring case.
    fn server_info(&self, name: &str) -> Option<ServerInfo>;

    /// All known backend servers.
    fn server_infos(&self) -> Vec<ServerInfo>;

    /// Name of the server `player` is on, or `None` when not online.
    fn server_name_for_player(&self, player: &str) -> Option<String>;

    /// Asks the proxy to move `player` to `server`. Returns `false` when the
    /// player or server is unknown.
    fn connect_player(&self, player: &str, server: &str) -> bool;

    /// Names of every player connected to the proxy.
    fn online_player_names(&self) -> Vec<String>;

    /// Runs `command` as the proxy console. Returns `false` when the proxy
    /// did not accept it.
    fn run_console_command(&self, command: &str) -> bool;

    fn send_chat_messages_to_player(&self, player: &str, messages: &[String]);

    fn send_chat_messages_to_console(&self, messages: &[String]);

    /// Sends a message to the named servers, or to every online server when
    /// `servers` is empty.
    fn send_to_servers(&self, channel: &str, payload: &[u8], servers: &[String]);

    /// Sends a message to one server tagged with the correlation id the reply
    /// must carry.
    fn send_request(&self, channel: &str, payload: &[u8], server: &str, correlation_id: u64);
}
