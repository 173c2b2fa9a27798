// hearth-core: Entity registry, state synchronization, and automation
// engine. Sits between hearth-api and consumers (control surfaces).
//
// Everything is wired explicitly at startup: construct a registry over a
// store, a bridge client, a `SyncEngine`, a `SceneApplier`, and an
// `AutomationEngine` fed from the sync engine's event channel. No global
// state; fresh instances per test.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod notify;
pub mod registry;
pub mod scenes;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::BridgeApi;
pub use commands::command_for_state;
pub use config::SyncConfig;
pub use engine::{AutomationEngine, TICK_INTERVAL};
pub use error::CoreError;
pub use notify::{LogNotifier, Notifier};
pub use registry::EntityRegistry;
pub use scenes::SceneApplier;
pub use storage::{EntityStore, JsonFileStore, MemoryStore, StorageError};
pub use sync::SyncEngine;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Action, Automation, ChangeEvent, Condition, DataPoint, Entity, EntityKind, EntityRecord,
    EntityVariant, Scene, SceneState, Trigger,
};

// Transport types consumers commonly need alongside the core.
pub use hearth_api::{PushState, RemoteEntity, RemoteState};
