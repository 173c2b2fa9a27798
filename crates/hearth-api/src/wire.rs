// ── Push protocol wire types ──
//
// JSON messages exchanged over the push socket. Everything is tagged on a
// `type` field; unknown server message types deserialize into `Unknown` so
// one unrecognized frame never kills the receive loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → bridge messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authentication handshake, sent immediately after the socket opens.
    Auth {
        username: String,
        password: String,
        client_type: String,
        version: String,
    },
    /// Channel subscription, sent after a successful auth response.
    Subscribe { subscription_type: Subscription },
    /// Outbound entity command over the push socket.
    EntityCommand {
        entity_id: String,
        command: String,
        parameters: Value,
        /// Unix timestamp (seconds) at send time.
        timestamp: i64,
    },
    /// Reply to a protocol-level ping.
    Pong,
}

/// Subscription channels the bridge offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    Entities,
    Notifications,
}

/// Bridge → client messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// An entity changed state on the bridge.
    EntityStateChanged {
        entity_id: String,
        state: StatePayload,
    },
    /// A user-facing notification pushed by the bridge.
    Notification {
        title: String,
        body: String,
        #[serde(default)]
        data: Option<Value>,
    },
    /// Result of the auth handshake.
    AuthResponse {
        success: bool,
        #[serde(default)]
        message: String,
    },
    /// Protocol-level heartbeat; answered with [`ClientMessage::Pong`].
    Ping,
    /// Anything this client does not understand. Logged and dropped.
    #[serde(other)]
    Unknown,
}

/// The `state` object carried by an `entity_state_changed` message.
#[derive(Debug, Clone, Deserialize)]
pub struct StatePayload {
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
}
