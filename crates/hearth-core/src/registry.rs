// ── Entity registry ──
//
// The canonical in-memory set of entities, guarded by one mutex and
// persisted in full after every mutating operation. The snapshot is
// copied under the lock; serialization and file I/O happen outside it,
// so the lock is never held across I/O.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::{ChangeEvent, Entity, EntityRecord};
use crate::storage::EntityStore;

/// The canonical local entity set.
pub struct EntityRegistry {
    entities: Mutex<HashMap<String, Entity>>,
    store: Box<dyn EntityStore>,
}

impl EntityRegistry {
    pub fn new(store: Box<dyn EntityStore>) -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Load the registry from its store.
    ///
    /// A read or parse failure is logged and leaves the registry empty --
    /// a damaged store file must never prevent startup. Records with an
    /// unrecognized display type are skipped individually.
    pub fn load(&self) {
        let records = match self.store.load() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to load entity store, starting empty");
                return;
            }
        };

        let mut map = self.entities.lock().unwrap();
        map.clear();
        for record in records {
            let display_type = record.display_type.clone();
            match Entity::from_record(record) {
                Some(entity) => {
                    map.insert(entity.id.clone(), entity);
                }
                None => warn!(display_type = %display_type, "skipping record with unknown display type"),
            }
        }
        info!(count = map.len(), "entity registry loaded");
    }

    /// Persist the current record set.
    pub fn save(&self) {
        let records = self.snapshot_records();
        self.persist(&records);
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// Entity by local id.
    pub fn get(&self, id: &str) -> Option<Entity> {
        self.entities.lock().unwrap().get(id).cloned()
    }

    /// Entity by bridge-assigned id.
    pub fn get_by_remote(&self, remote_id: &str) -> Option<Entity> {
        self.entities
            .lock()
            .unwrap()
            .values()
            .find(|e| e.remote_id == remote_id)
            .cloned()
    }

    /// All entities, ordered by their user-assigned position.
    pub fn all(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.entities.lock().unwrap().values().cloned().collect();
        entities.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        entities
    }

    pub fn len(&self) -> usize {
        self.entities.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.lock().unwrap().is_empty()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert or replace an entity.
    ///
    /// A new entity (empty local id) gets a generated id and the next
    /// free position. Returns the stored entity.
    pub fn upsert(&self, mut entity: Entity) -> Entity {
        let records;
        let stored;
        {
            let mut map = self.entities.lock().unwrap();
            if entity.id.is_empty() {
                entity.id = Uuid::new_v4().to_string();
                entity.order = map.len() as u32;
            }
            stored = entity.clone();
            map.insert(entity.id.clone(), entity);
            records = Self::records_of(&map);
        }
        self.persist(&records);
        info!(entity = %stored.name, remote_id = %stored.remote_id, "entity upserted");
        stored
    }

    /// Remove an entity by local id. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let (removed, records) = {
            let mut map = self.entities.lock().unwrap();
            let removed = map.remove(id).is_some();
            (removed, Self::records_of(&map))
        };
        if removed {
            self.persist(&records);
        }
        removed
    }

    /// Move an entity to a new position, shifting the entities in
    /// between by one so the total ordering stays contiguous and unique.
    /// Returns whether the entity existed.
    pub fn reorder(&self, id: &str, new_order: u32) -> bool {
        let records = {
            let mut map = self.entities.lock().unwrap();
            let Some(old_order) = map.get(id).map(|e| e.order) else {
                return false;
            };

            for entity in map.values_mut().filter(|e| e.id != id) {
                if new_order < old_order && entity.order >= new_order && entity.order < old_order {
                    entity.order += 1;
                } else if new_order > old_order
                    && entity.order > old_order
                    && entity.order <= new_order
                {
                    entity.order -= 1;
                }
            }
            if let Some(entity) = map.get_mut(id) {
                entity.order = new_order;
            }
            Self::records_of(&map)
        };
        self.persist(&records);
        true
    }

    /// Apply an inbound state update, keyed by bridge id.
    ///
    /// Compare-before-mutate: when neither the state nor any of the
    /// variant's tracked attributes differ, nothing is touched and no
    /// event is produced -- applying the same update twice yields exactly
    /// one change event, regardless of which transport delivered it.
    /// Updates for unknown entities are ignored.
    pub fn apply_state(
        &self,
        remote_id: &str,
        state: &str,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Option<ChangeEvent> {
        let (event, records) = {
            let mut map = self.entities.lock().unwrap();
            let entity = map.values_mut().find(|e| e.remote_id == remote_id)?;

            let tracked_changed = entity
                .variant
                .tracked_attributes()
                .iter()
                .any(|key| entity.attributes.get(*key) != attributes.get(*key));
            if entity.state == state && !tracked_changed {
                return None;
            }

            let old_state = entity.state.clone();
            entity.apply_state(state, attributes.clone());

            let event = ChangeEvent::StateChanged {
                entity_id: remote_id.to_owned(),
                old_state: Some(old_state),
                new_state: state.to_owned(),
                attributes,
            };
            (event, Self::records_of(&map))
        };
        self.persist(&records);
        Some(event)
    }

    // ── Persistence helpers ──────────────────────────────────────────

    fn snapshot_records(&self) -> Vec<EntityRecord> {
        Self::records_of(&self.entities.lock().unwrap())
    }

    fn records_of(map: &HashMap<String, Entity>) -> Vec<EntityRecord> {
        map.values().map(Entity::to_record).collect()
    }

    fn persist(&self, records: &[EntityRecord]) {
        if let Err(e) = self.store.save(records) {
            error!(error = %e, "failed to persist entity registry");
        }
    }
}
