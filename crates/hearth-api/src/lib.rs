// hearth-api: Async transport layer for a Hearth smart-home bridge.
//
// Two surfaces: the HTTP command API (`BridgeClient`) and the persistent
// push socket (`PushTransport`). Both return typed errors; `hearth-core`
// adapts them into its best-effort contract.

pub mod bridge;
pub mod error;
pub mod push;
pub mod transport;
pub mod wire;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{BridgeClient, RemoteEntity, RemoteState};
pub use error::Error;
pub use push::{PushConfig, PushEvent, PushState, PushTransport};
pub use transport::{Credentials, TransportConfig};
pub use wire::{ClientMessage, ServerMessage, StatePayload, Subscription};
