// ── Domain model ──

mod automation;
mod entity;
mod event;
mod scene;

pub use automation::{Action, Automation, Condition, Trigger};
pub use entity::{DataPoint, Entity, EntityKind, EntityRecord, EntityVariant};
pub use event::ChangeEvent;
pub use scene::{Scene, SceneState};
