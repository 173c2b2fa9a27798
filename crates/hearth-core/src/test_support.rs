// Shared fakes for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use hearth_api::{RemoteEntity, RemoteState};

use crate::bridge::BridgeApi;
use crate::notify::Notifier;

/// Recording bridge fake. Commands are captured in order; failures are
/// injected per entity id.
#[derive(Default)]
pub struct FakeBridge {
    commands: Mutex<Vec<(String, String, Map<String, Value>)>>,
    fail_entities: Mutex<HashSet<String>>,
    remote_entities: Mutex<Vec<RemoteEntity>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `send_command` for this entity id will report failure.
    pub fn fail_entity(&self, entity_id: &str) {
        self.fail_entities.lock().unwrap().insert(entity_id.into());
    }

    /// What `list_entities` returns.
    pub fn set_remote_entities(&self, entities: Vec<RemoteEntity>) {
        *self.remote_entities.lock().unwrap() = entities;
    }

    /// All commands sent so far, in order.
    pub fn commands(&self) -> Vec<(String, String, Map<String, Value>)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeApi for FakeBridge {
    async fn test_connection(&self) -> bool {
        true
    }

    async fn list_entities(&self) -> Vec<RemoteEntity> {
        self.remote_entities.lock().unwrap().clone()
    }

    async fn get_state(&self, remote_id: &str) -> Option<RemoteState> {
        self.remote_entities
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.entity_id == remote_id)
            .map(|e| RemoteState {
                entity_id: e.entity_id.clone(),
                state: e.state.clone(),
                attributes: e.attributes.clone(),
                last_changed: None,
                last_updated: None,
            })
    }

    async fn send_command(
        &self,
        entity_id: &str,
        command: &str,
        parameters: Map<String, Value>,
    ) -> bool {
        self.commands
            .lock()
            .unwrap()
            .push((entity_id.into(), command.into(), parameters));
        !self.fail_entities.lock().unwrap().contains(entity_id)
    }
}

/// Recording notifier fake.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((title.into(), body.into()));
    }

    fn entity_state_changed(&self, _entity_name: &str, _new_state: &str) {}
}
