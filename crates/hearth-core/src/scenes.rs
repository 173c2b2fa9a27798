// ── Scene applier ──
//
// Applies a batch of desired entity states as a sequence of independent
// remote commands. Best-effort throughout: every entity command is
// attempted even when earlier ones fail, and the post-activation notice
// to the bridge never affects the reported outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::BridgeApi;
use crate::commands::command_for_state;
use crate::error::CoreError;
use crate::model::Scene;
use crate::registry::EntityRegistry;

/// Holds the scene set and applies scenes through the bridge.
pub struct SceneApplier {
    scenes: Mutex<HashMap<String, Scene>>,
    bridge: Arc<dyn BridgeApi>,
}

impl SceneApplier {
    pub fn new(bridge: Arc<dyn BridgeApi>) -> Self {
        Self {
            scenes: Mutex::new(HashMap::new()),
            bridge,
        }
    }

    // ── Scene set ────────────────────────────────────────────────────

    /// Insert or replace a scene. A new scene (empty id) gets a
    /// generated one. Returns the stored scene.
    pub fn add(&self, mut scene: Scene) -> Scene {
        if scene.id.is_empty() {
            scene.id = Uuid::new_v4().to_string();
        }
        let stored = scene.clone();
        self.scenes.lock().unwrap().insert(scene.id.clone(), scene);
        stored
    }

    pub fn remove(&self, scene_id: &str) -> bool {
        self.scenes.lock().unwrap().remove(scene_id).is_some()
    }

    pub fn get(&self, scene_id: &str) -> Option<Scene> {
        self.scenes.lock().unwrap().get(scene_id).cloned()
    }

    pub fn list(&self) -> Vec<Scene> {
        let mut scenes: Vec<Scene> = self.scenes.lock().unwrap().values().cloned().collect();
        scenes.sort_by(|a, b| a.name.cmp(&b.name));
        scenes
    }

    /// Build a scene from the current registry state of the given
    /// entities and store it.
    pub fn capture<I, S>(&self, name: &str, entity_ids: I, registry: &EntityRegistry) -> Scene
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scene = Scene::new(name);
        for entity_id in entity_ids {
            if let Some(entity) = registry.get_by_remote(entity_id.as_ref()) {
                scene.set_entity_state(&entity.remote_id, &entity.state, entity.attributes);
            }
        }
        self.add(scene)
    }

    // ── Activation ───────────────────────────────────────────────────

    /// Activate a scene: one command per listed entity, best-effort.
    ///
    /// Entities not listed in the scene are untouched. After the
    /// commands, the scene is marked active with a fresh activation
    /// timestamp, and a best-effort "scene activated" notice goes to the
    /// bridge -- its failure does not affect the result.
    pub async fn activate(&self, scene_id: &str) -> Result<(), CoreError> {
        let scene = self.get(scene_id).ok_or_else(|| CoreError::SceneNotFound {
            id: scene_id.to_owned(),
        })?;

        info!(scene = %scene.name, entities = scene.entities.len(), "activating scene");

        for (entity_id, desired) in &scene.entities {
            let command = command_for_state(&desired.state);
            let sent = self
                .bridge
                .send_command(entity_id, command, desired.attributes.clone())
                .await;
            if !sent {
                warn!(entity = %entity_id, scene = %scene.name, "scene entity command failed");
            }
        }

        {
            let mut scenes = self.scenes.lock().unwrap();
            if let Some(stored) = scenes.get_mut(scene_id) {
                stored.active = true;
                stored.last_activated = Some(Utc::now());
            }
        }

        // Tell the bridge a scene went active, if it cares.
        let mut params = Map::new();
        params.insert("scene_id".into(), Value::String(scene_id.to_owned()));
        if !self.bridge.send_command("scene", "activate", params).await {
            debug!(scene = %scene.name, "scene activation notice failed");
        }

        Ok(())
    }
}
