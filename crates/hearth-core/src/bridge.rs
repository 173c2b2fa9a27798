// ── Bridge API seam ──
//
// The best-effort contract every consumer in this crate programs
// against: failures come back as `false`/`None`/empty, already logged.
// Retry policy belongs to callers -- the automation engine treats a
// failed action as reported-not-fatal, the scene applier treats each
// entity command independently.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use hearth_api::{BridgeClient, RemoteEntity, RemoteState};

/// Outbound command surface of the bridge.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// Probe connectivity. `false` covers both an unreachable bridge and
    /// a reachable one answering non-success.
    async fn test_connection(&self) -> bool;

    /// Every entity the bridge exposes; empty on failure.
    async fn list_entities(&self) -> Vec<RemoteEntity>;

    /// One entity's state; `None` when missing or on failure.
    async fn get_state(&self, remote_id: &str) -> Option<RemoteState>;

    /// Send a command. `false` on any failure; never retried here.
    async fn send_command(
        &self,
        entity_id: &str,
        command: &str,
        parameters: Map<String, Value>,
    ) -> bool;
}

#[async_trait]
impl BridgeApi for BridgeClient {
    async fn test_connection(&self) -> bool {
        match self.status().await {
            Ok(up) => up,
            Err(e) => {
                warn!(error = %e, "bridge connectivity probe failed");
                false
            }
        }
    }

    async fn list_entities(&self) -> Vec<RemoteEntity> {
        match BridgeClient::list_entities(self).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "failed to list bridge entities");
                Vec::new()
            }
        }
    }

    async fn get_state(&self, remote_id: &str) -> Option<RemoteState> {
        match self.state(remote_id).await {
            Ok(state) => Some(state),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(error = %e, remote_id, "failed to fetch entity state");
                None
            }
        }
    }

    async fn send_command(
        &self,
        entity_id: &str,
        command: &str,
        parameters: Map<String, Value>,
    ) -> bool {
        match self.command(entity_id, command, &parameters).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, entity_id, command, "bridge command failed");
                false
            }
        }
    }
}
