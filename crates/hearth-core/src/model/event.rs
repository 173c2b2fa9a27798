// ── Change events ──
//
// The normalized internal notification of an entity state transition,
// regardless of whether it originated from push or poll. Ephemeral:
// exists only for the duration of dispatch, never persisted.

use chrono::NaiveTime;
use serde_json::{Map, Value};

/// An event dispatched to the automation engine.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A real entity state transition observed by the sync engine.
    StateChanged {
        /// Bridge-assigned entity id.
        entity_id: String,
        old_state: Option<String>,
        new_state: String,
        attributes: Map<String, Value>,
    },
    /// Periodic tick for time-of-day triggers.
    TimeTick { time: NaiveTime },
}

impl ChangeEvent {
    /// The entity this event concerns, when it concerns one.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { entity_id, .. } => Some(entity_id),
            Self::TimeTick { .. } => None,
        }
    }
}
