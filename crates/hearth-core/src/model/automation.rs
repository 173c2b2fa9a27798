// ── Automation rules ──
//
// Trigger/condition/action rules evaluated against change events.
// The polymorphic pieces are tagged enums dispatched on a `type` field,
// so the same shapes round-trip through serialization unambiguously.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::event::ChangeEvent;

/// A user-defined automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u64,
    /// Any matching trigger qualifies the event.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// All conditions must hold, checked against current registry state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Executed in order; one failure never stops the rest.
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_enabled() -> bool {
    true
}

impl Automation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            last_triggered: None,
            trigger_count: 0,
            triggers: Vec::new(),
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Convenience builder for the common "when X goes to S, set Y to T"
    /// rule.
    pub fn simple(
        name: impl Into<String>,
        trigger_entity: impl Into<String>,
        to_state: impl Into<String>,
        action_entity: impl Into<String>,
        action_state: impl Into<String>,
    ) -> Self {
        let trigger_entity = trigger_entity.into();
        let to_state = to_state.into();
        let action_entity = action_entity.into();
        let action_state = action_state.into();

        let mut automation = Self::new(name);
        automation.description = format!(
            "When {trigger_entity} turns {to_state}, set {action_entity} to {action_state}"
        );
        automation.triggers.push(Trigger::State {
            entity_id: trigger_entity,
            from_state: None,
            to_state: Some(to_state),
        });
        automation.actions.push(Action::SetState {
            entity_id: action_entity,
            state: action_state,
            attributes: Map::new(),
        });
        automation
    }

    /// Whether any trigger matches the event. Conditions are checked
    /// separately by the engine against the live registry.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.enabled && self.triggers.iter().any(|t| t.matches(event))
    }
}

// ── Triggers ─────────────────────────────────────────────────────────

/// What can activate an automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// An entity state transition. `from_state`/`to_state` constrain the
    /// transition when set; unset means "any".
    State {
        entity_id: String,
        #[serde(default)]
        from_state: Option<String>,
        #[serde(default)]
        to_state: Option<String>,
    },
    /// A time of day, matched against the minute ticker.
    Time { at: NaiveTime },
}

impl Trigger {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (
                Self::State {
                    entity_id,
                    from_state,
                    to_state,
                },
                ChangeEvent::StateChanged {
                    entity_id: event_entity,
                    old_state,
                    new_state,
                    ..
                },
            ) => {
                if entity_id != event_entity {
                    return false;
                }
                if let Some(from) = from_state {
                    if old_state.as_deref() != Some(from.as_str()) {
                        return false;
                    }
                }
                if let Some(to) = to_state {
                    if new_state != to {
                        return false;
                    }
                }
                true
            }
            (Self::Time { at }, ChangeEvent::TimeTick { time }) => {
                // Within one minute of the configured time of day.
                (*time - *at).abs() < chrono::Duration::minutes(1)
            }
            _ => false,
        }
    }
}

// ── Conditions ───────────────────────────────────────────────────────

/// A gate checked against *current* registry state, not the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// The named entity currently has exactly this state.
    #[serde(rename = "state")]
    EntityState { entity_id: String, state: String },
}

// ── Actions ──────────────────────────────────────────────────────────

/// What a qualifying automation does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Drive an entity to a target state, forwarding attributes verbatim.
    #[serde(rename = "state")]
    SetState {
        entity_id: String,
        state: String,
        #[serde(default)]
        attributes: Map<String, Value>,
    },
    /// Activate a scene.
    Scene { scene_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_event(entity: &str, old: Option<&str>, new: &str) -> ChangeEvent {
        ChangeEvent::StateChanged {
            entity_id: entity.into(),
            old_state: old.map(String::from),
            new_state: new.into(),
            attributes: Map::new(),
        }
    }

    #[test]
    fn state_trigger_matches_exact_transition() {
        let trigger = Trigger::State {
            entity_id: "binary_sensor.motion".into(),
            from_state: Some("off".into()),
            to_state: Some("on".into()),
        };

        assert!(trigger.matches(&state_event("binary_sensor.motion", Some("off"), "on")));
        assert!(!trigger.matches(&state_event("binary_sensor.motion", Some("on"), "on")));
        assert!(!trigger.matches(&state_event("binary_sensor.motion", Some("off"), "off")));
        assert!(!trigger.matches(&state_event("binary_sensor.other", Some("off"), "on")));
    }

    #[test]
    fn state_trigger_with_unset_bounds_matches_any_transition() {
        let trigger = Trigger::State {
            entity_id: "switch.fan".into(),
            from_state: None,
            to_state: None,
        };

        assert!(trigger.matches(&state_event("switch.fan", Some("off"), "on")));
        assert!(trigger.matches(&state_event("switch.fan", None, "off")));
    }

    #[test]
    fn state_trigger_requires_known_old_state_when_from_is_set() {
        let trigger = Trigger::State {
            entity_id: "switch.fan".into(),
            from_state: Some("off".into()),
            to_state: None,
        };

        assert!(!trigger.matches(&state_event("switch.fan", None, "on")));
    }

    #[test]
    fn state_trigger_ignores_time_ticks() {
        let trigger = Trigger::State {
            entity_id: "switch.fan".into(),
            from_state: None,
            to_state: None,
        };
        let tick = ChangeEvent::TimeTick {
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        };
        assert!(!trigger.matches(&tick));
    }

    #[test]
    fn time_trigger_matches_within_one_minute() {
        let trigger = Trigger::Time {
            at: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
        };

        let near = ChangeEvent::TimeTick {
            time: NaiveTime::from_hms_opt(7, 30, 40).unwrap(),
        };
        let far = ChangeEvent::TimeTick {
            time: NaiveTime::from_hms_opt(7, 31, 5).unwrap(),
        };

        assert!(trigger.matches(&near));
        assert!(!trigger.matches(&far));
    }

    #[test]
    fn disabled_automation_never_matches() {
        let mut automation =
            Automation::simple("fan", "switch.a", "on", "switch.b", "on");
        assert!(automation.matches(&state_event("switch.a", Some("off"), "on")));

        automation.enabled = false;
        assert!(!automation.matches(&state_event("switch.a", Some("off"), "on")));
    }

    #[test]
    fn trigger_wire_format_uses_type_tags() {
        let trigger = Trigger::State {
            entity_id: "binary_sensor.motion".into(),
            from_state: None,
            to_state: Some("on".into()),
        };
        let value = serde_json::to_value(&trigger).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["to_state"], "on");

        let parsed: Trigger = serde_json::from_value(json!({
            "type": "time",
            "at": "07:30:00",
        }))
        .unwrap();
        assert!(matches!(parsed, Trigger::Time { .. }));
    }

    #[test]
    fn action_wire_format_uses_type_tags() {
        let action = Action::SetState {
            entity_id: "light.lr".into(),
            state: "on".into(),
            attributes: Map::new(),
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "state");

        let scene = Action::Scene {
            scene_id: "scene-1".into(),
        };
        let value = serde_json::to_value(&scene).unwrap();
        assert_eq!(value["type"], "scene");
    }

    #[test]
    fn simple_builder_wires_trigger_and_action() {
        let automation = Automation::simple(
            "motion light",
            "binary_sensor.motion",
            "on",
            "light.living_room",
            "on",
        );

        assert_eq!(automation.triggers.len(), 1);
        assert_eq!(automation.actions.len(), 1);
        assert!(automation.matches(&state_event("binary_sensor.motion", Some("off"), "on")));
    }
}
