// ── Scenes ──
//
// A named batch of desired entity states applied together. Entities not
// listed in a scene are untouched when it activates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named batch of desired entity states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub last_activated: Option<DateTime<Utc>>,
    /// Desired state per bridge entity id.
    #[serde(default)]
    pub entities: HashMap<String, SceneState>,
}

fn default_icon() -> String {
    "mdi:palette".into()
}

/// The desired state of one entity within a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            icon: default_icon(),
            active: false,
            last_activated: None,
            entities: HashMap::new(),
        }
    }

    /// Set the desired state for one entity.
    pub fn set_entity_state(
        &mut self,
        entity_id: impl Into<String>,
        state: impl Into<String>,
        attributes: Map<String, Value>,
    ) {
        self.entities.insert(
            entity_id.into(),
            SceneState {
                state: state.into(),
                attributes,
            },
        );
    }

    /// Drop an entity from the scene.
    pub fn remove_entity_state(&mut self, entity_id: &str) {
        self.entities.remove(entity_id);
    }

    /// The desired state for one entity, when listed.
    pub fn entity_state(&self, entity_id: &str) -> Option<&SceneState> {
        self.entities.get(entity_id)
    }
}
