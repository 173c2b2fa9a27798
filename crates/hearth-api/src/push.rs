//! Push transport with auto-reconnect.
//!
//! Maintains one persistent socket to the bridge for inbound state-change
//! and notification events. Owns the authentication handshake, channel
//! subscription, protocol heartbeat, and reconnection after unexpected
//! drops. Inbound events are fanned out through a
//! [`tokio::sync::broadcast`] channel; connection state is observable via
//! a [`tokio::sync::watch`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hearth_api::push::{PushConfig, PushState, PushTransport};
//! use tokio::sync::watch;
//!
//! let (state_tx, _) = watch::channel(PushState::Disconnected);
//! let transport = PushTransport::new(config, Arc::new(state_tx));
//! transport.connect().await?;
//!
//! let mut events = transport.events();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//!
//! transport.disconnect().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::wire::{ClientMessage, ServerMessage, StatePayload, Subscription};

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

/// `client_type` reported in the auth handshake.
const CLIENT_TYPE: &str = "hearth";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OutboundSlot = Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>;

// ── PushState ────────────────────────────────────────────────────────

/// Connection state observable by consumers.
///
/// `Reconnecting` is entered automatically after an unexpected close or
/// receive error; an explicit [`PushTransport::disconnect`] always ends in
/// `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    Reconnecting { attempt: u32 },
}

// ── PushEvent ────────────────────────────────────────────────────────

/// An inbound event parsed from the push socket.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// An entity changed state on the bridge.
    StateChanged {
        entity_id: String,
        state: StatePayload,
    },
    /// A user-facing notification pushed by the bridge.
    Notification {
        title: String,
        body: String,
        data: Option<Value>,
    },
}

// ── PushConfig ───────────────────────────────────────────────────────

/// Connection settings for the push socket.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Socket URL (e.g. `ws://192.168.1.50:8002/events`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    /// Client version reported in the auth handshake.
    pub client_version: String,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_delay: Duration,
}

// ── PushTransport ────────────────────────────────────────────────────

/// The persistent push connection to the bridge.
///
/// `connect`/`disconnect` are serialized by an internal lock, so
/// concurrent callers can never race two sockets open. `connect` returns
/// once the socket is open and the auth message is sent; subscription and
/// message pumping happen on a background task.
pub struct PushTransport {
    config: PushConfig,
    state_tx: Arc<watch::Sender<PushState>>,
    event_tx: broadcast::Sender<PushEvent>,
    conn: Mutex<Option<Connection>>,
    outbound: OutboundSlot,
}

struct Connection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PushTransport {
    /// Create a transport. Does not connect; the `state` sender is shared
    /// so owners (e.g. the sync engine) can observe it independently.
    pub fn new(config: PushConfig, state: Arc<watch::Sender<PushState>>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state_tx: state,
            event_tx,
            conn: Mutex::new(None),
            outbound: Arc::new(Mutex::new(None)),
        }
    }

    /// Get a new broadcast receiver for inbound push events.
    pub fn events(&self) -> broadcast::Receiver<PushEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<PushState> {
        self.state_tx.subscribe()
    }

    /// Whether the transport currently holds a subscribed connection.
    pub fn is_subscribed(&self) -> bool {
        *self.state_tx.borrow() == PushState::Subscribed
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the socket, send the auth handshake, and spawn the session
    /// supervisor. No-op when already connected.
    ///
    /// On failure the state returns to `Disconnected` and the error is
    /// returned; nothing keeps retrying a connection that never opened.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut conn = self.conn.lock().await;
        if let Some(existing) = conn.as_ref() {
            // A finished task means the supervisor ended on its own
            // (auth rejection); treat the slot as free.
            if !existing.task.is_finished() {
                debug!("push transport already connected");
                return Ok(());
            }
            conn.take();
        }

        let ws = match establish(&self.config, &self.state_tx).await {
            Ok(ws) => ws,
            Err(e) => {
                self.state_tx.send_replace(PushState::Disconnected);
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            self.config.clone(),
            Arc::clone(&self.state_tx),
            self.event_tx.clone(),
            Arc::clone(&self.outbound),
            cancel.clone(),
            ws,
        ));
        *conn = Some(Connection { cancel, task });
        Ok(())
    }

    /// Disconnect from the bridge. Idempotent.
    ///
    /// Cancels the session, waits for the background task (no event is
    /// delivered after this returns), and always ends `Disconnected` --
    /// the state change is the connection-status signal, emitted whether
    /// or not the close handshake succeeded.
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(c) = conn.take() {
            c.cancel.cancel();
            let _ = c.task.await;
        }
        self.outbound.lock().await.take();
        self.state_tx.send_replace(PushState::Disconnected);
        debug!("push transport disconnected");
    }

    /// Disconnect, wait the configured backoff, connect again.
    pub async fn reconnect(&self) -> Result<(), Error> {
        self.disconnect().await;
        tokio::time::sleep(self.config.reconnect_delay).await;
        self.connect().await
    }

    // ── Outbound commands ────────────────────────────────────────────

    /// Send an entity command over the push socket.
    ///
    /// Fails with [`Error::NotConnected`] when no session is live.
    pub async fn send_entity_command(
        &self,
        entity_id: &str,
        command: &str,
        parameters: Value,
    ) -> Result<(), Error> {
        let tx = self
            .outbound
            .lock()
            .await
            .clone()
            .ok_or(Error::NotConnected)?;

        let msg = ClientMessage::EntityCommand {
            entity_id: entity_id.to_owned(),
            command: command.to_owned(),
            parameters,
            timestamp: Utc::now().timestamp(),
        };
        tx.send(msg).await.map_err(|_| Error::NotConnected)
    }
}

// ── Connection establishment ─────────────────────────────────────────

/// Open the socket and send the auth message.
///
/// Leaves the state at `Authenticating` on success; the caller decides
/// what a failure means (`Disconnected` for an explicit connect,
/// `Reconnecting` inside the supervisor).
async fn establish(
    config: &PushConfig,
    state_tx: &watch::Sender<PushState>,
) -> Result<WsStream, Error> {
    state_tx.send_replace(PushState::Connecting);
    info!(url = %config.url, "connecting push socket");

    let (mut ws, _response) = connect_async(config.url.as_str())
        .await
        .map_err(|e| Error::PushConnect(e.to_string()))?;

    let auth = ClientMessage::Auth {
        username: config.username.clone(),
        password: config.password.expose_secret().to_owned(),
        client_type: CLIENT_TYPE.into(),
        version: config.client_version.clone(),
    };
    send_message(&mut ws, &auth).await?;
    state_tx.send_replace(PushState::Authenticating);

    Ok(ws)
}

// ── Session supervisor ───────────────────────────────────────────────

/// Why a session ended.
enum SessionEnd {
    /// Cancelled via token (explicit disconnect or shutdown).
    Cancelled,
    /// Bridge rejected authentication -- terminal, no auto-reconnect.
    AuthRejected,
    /// Connection dropped (close frame, EOF, or send/receive error).
    Dropped,
}

/// Run sessions until cancelled or authentication is rejected.
///
/// After a drop: enter `Reconnecting`, wait the fixed backoff, re-dial.
async fn supervise(
    config: PushConfig,
    state_tx: Arc<watch::Sender<PushState>>,
    event_tx: broadcast::Sender<PushEvent>,
    outbound: OutboundSlot,
    cancel: CancellationToken,
    first_ws: WsStream,
) {
    let mut attempt: u32 = 0;
    let mut next_ws = Some(first_ws);

    loop {
        let ws = match next_ws.take() {
            Some(ws) => ws,
            None => match establish(&config, &state_tx).await {
                Ok(ws) => ws,
                Err(e) => {
                    attempt += 1;
                    warn!(error = %e, attempt, "push reconnect failed");
                    state_tx.send_replace(PushState::Reconnecting { attempt });
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(config.reconnect_delay) => {}
                    }
                    continue;
                }
            },
        };
        attempt = 0;

        // Keep a local sender alive so the session's outbound receiver
        // can never observe a closed channel mid-session.
        let (out_tx, mut out_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        *outbound.lock().await = Some(out_tx.clone());

        let end = run_session(ws, &state_tx, &event_tx, &mut out_rx, &cancel).await;
        outbound.lock().await.take();
        drop(out_tx);

        match end {
            SessionEnd::Cancelled => break,
            SessionEnd::AuthRejected => {
                state_tx.send_replace(PushState::Disconnected);
                break;
            }
            SessionEnd::Dropped => {
                attempt += 1;
                state_tx.send_replace(PushState::Reconnecting { attempt });
                info!(
                    delay_ms = config.reconnect_delay.as_millis() as u64,
                    attempt, "push connection lost, reconnecting"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                }
            }
        }
    }

    debug!("push supervisor exiting");
}

// ── Single session ───────────────────────────────────────────────────

/// Pump one live connection: inbound frames, outbound commands, heartbeat.
///
/// Messages are processed in arrival order. Any receive or send error
/// terminates the session; it never propagates past the supervisor.
async fn run_session(
    mut ws: WsStream,
    state_tx: &watch::Sender<PushState>,
    event_tx: &broadcast::Sender<PushEvent>,
    out_rx: &mut mpsc::Receiver<ClientMessage>,
    cancel: &CancellationToken,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Graceful close, best-effort.
                let _ = ws.close(None).await;
                return SessionEnd::Cancelled;
            }
            outbound = out_rx.recv() => {
                if let Some(msg) = outbound {
                    if let Err(e) = send_message(&mut ws, &msg).await {
                        warn!(error = %e, "push send failed");
                        return SessionEnd::Dropped;
                    }
                }
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = handle_frame(&text, &mut ws, state_tx, event_tx).await {
                            return end;
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers transport-level pings itself.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "push socket closed by bridge");
                        return SessionEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "push receive error");
                        return SessionEnd::Dropped;
                    }
                    None => {
                        info!("push stream ended");
                        return SessionEnd::Dropped;
                    }
                    _ => {
                        // Binary, Pong, raw frames -- ignore.
                    }
                }
            }
        }
    }
}

/// Dispatch one complete text frame.
///
/// Returns `Some(end)` when the frame terminates the session; malformed
/// and unrecognized frames are logged and dropped.
async fn handle_frame(
    text: &str,
    ws: &mut WsStream,
    state_tx: &watch::Sender<PushState>,
    event_tx: &broadcast::Sender<PushEvent>,
) -> Option<SessionEnd> {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "failed to parse push frame");
            return None;
        }
    };

    match msg {
        ServerMessage::EntityStateChanged { entity_id, state } => {
            // Ignore send errors -- no active subscribers right now.
            let _ = event_tx.send(PushEvent::StateChanged { entity_id, state });
            None
        }
        ServerMessage::Notification { title, body, data } => {
            let _ = event_tx.send(PushEvent::Notification { title, body, data });
            None
        }
        ServerMessage::AuthResponse { success: true, .. } => {
            info!("push authentication successful");
            for channel in [Subscription::Entities, Subscription::Notifications] {
                let subscribe = ClientMessage::Subscribe {
                    subscription_type: channel,
                };
                if let Err(e) = send_message(ws, &subscribe).await {
                    warn!(error = %e, "push subscribe failed");
                    return Some(SessionEnd::Dropped);
                }
            }
            state_tx.send_replace(PushState::Subscribed);
            None
        }
        ServerMessage::AuthResponse {
            success: false,
            message,
        } => {
            warn!(message = %message, "push authentication rejected");
            Some(SessionEnd::AuthRejected)
        }
        ServerMessage::Ping => match send_message(ws, &ClientMessage::Pong).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "pong reply failed");
                Some(SessionEnd::Dropped)
            }
        },
        ServerMessage::Unknown => {
            debug!(frame = %text, "unrecognized push message type");
            None
        }
    }
}

/// Serialize and send one client message as a text frame.
async fn send_message(ws: &mut WsStream, msg: &ClientMessage) -> Result<(), Error> {
    let payload = serde_json::to_string(msg).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })?;
    ws.send(Message::Text(payload.into()))
        .await
        .map_err(|e| Error::PushConnect(e.to_string()))
}
