// ── Entity model ──
//
// A locally mirrored smart-home entity. The common fields are shared by
// every entity; the display variant carries the typed fields a control
// surface renders. Exactly one variant per entity, chosen at creation,
// immutable thereafter -- state updates only change fields within it.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display-type tag selecting an [`EntityVariant`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Toggle,
    Sensor,
    Light,
    Climate,
    Gauge,
    Graph,
}

/// One point in a graph entity's time series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Typed per-display fields, derived from `state`/`attributes` on each
/// update.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityVariant {
    Toggle {
        on: bool,
    },
    Sensor {
        value: f64,
        unit: String,
    },
    Light {
        on: bool,
        /// 0-255, as the bridge reports it.
        brightness: u8,
        rgb: [u8; 3],
    },
    Climate {
        current: f64,
        target: f64,
        hvac_mode: String,
        hvac_action: String,
        min_temp: f64,
        max_temp: f64,
    },
    Gauge {
        value: f64,
        unit: String,
        min: f64,
        max: f64,
    },
    Graph {
        value: f64,
        unit: String,
        history_hours: i64,
        points: VecDeque<DataPoint>,
    },
}

impl EntityVariant {
    /// Construct the default variant for a display type. Gauge bounds and
    /// graph window come from the entity's `config` map.
    pub fn new(kind: EntityKind, config: &HashMap<String, String>) -> Self {
        match kind {
            EntityKind::Toggle => Self::Toggle { on: false },
            EntityKind::Sensor => Self::Sensor {
                value: 0.0,
                unit: String::new(),
            },
            EntityKind::Light => Self::Light {
                on: false,
                brightness: 0,
                rgb: [255, 255, 255],
            },
            EntityKind::Climate => Self::Climate {
                current: 20.0,
                target: 20.0,
                hvac_mode: "off".into(),
                hvac_action: "idle".into(),
                min_temp: 15.0,
                max_temp: 30.0,
            },
            EntityKind::Gauge => Self::Gauge {
                value: 0.0,
                unit: String::new(),
                min: config_f64(config, "min").unwrap_or(0.0),
                max: config_f64(config, "max").unwrap_or(100.0),
            },
            EntityKind::Graph => Self::Graph {
                value: 0.0,
                unit: String::new(),
                history_hours: config_f64(config, "history_hours")
                    .map(|h| h as i64)
                    .unwrap_or(24),
                points: VecDeque::new(),
            },
        }
    }

    /// The display-type tag this variant answers to.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Toggle { .. } => EntityKind::Toggle,
            Self::Sensor { .. } => EntityKind::Sensor,
            Self::Light { .. } => EntityKind::Light,
            Self::Climate { .. } => EntityKind::Climate,
            Self::Gauge { .. } => EntityKind::Gauge,
            Self::Graph { .. } => EntityKind::Graph,
        }
    }

    /// Attribute keys this variant's fields derive from. The poll diff
    /// compares exactly these, so an attribute nobody renders can never
    /// fire an automation.
    pub fn tracked_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Toggle { .. } => &[],
            Self::Sensor { .. } | Self::Gauge { .. } | Self::Graph { .. } => {
                &["unit_of_measurement"]
            }
            Self::Light { .. } => &["brightness", "rgb_color"],
            Self::Climate { .. } => &[
                "current_temperature",
                "temperature",
                "hvac_action",
                "min_temp",
                "max_temp",
            ],
        }
    }

    /// Re-derive variant fields from a new state and attribute set.
    pub fn apply(&mut self, state: &str, attributes: &Map<String, Value>) {
        match self {
            Self::Toggle { on } => {
                *on = state.eq_ignore_ascii_case("on");
            }
            Self::Sensor { value, unit } => {
                if let Ok(v) = state.parse::<f64>() {
                    *value = v;
                }
                if let Some(u) = attr_str(attributes, "unit_of_measurement") {
                    *unit = u;
                }
            }
            Self::Light {
                on,
                brightness,
                rgb,
            } => {
                *on = state.eq_ignore_ascii_case("on");
                if let Some(b) = attr_f64(attributes, "brightness") {
                    *brightness = b.clamp(0.0, 255.0) as u8;
                }
                if let Some(color) = attr_rgb(attributes) {
                    *rgb = color;
                }
            }
            Self::Climate {
                current,
                target,
                hvac_mode,
                hvac_action,
                min_temp,
                max_temp,
            } => {
                *hvac_mode = state.to_owned();
                if let Some(t) = attr_f64(attributes, "current_temperature") {
                    *current = t;
                }
                if let Some(t) = attr_f64(attributes, "temperature") {
                    *target = t;
                }
                if let Some(a) = attr_str(attributes, "hvac_action") {
                    *hvac_action = a;
                }
                if let Some(t) = attr_f64(attributes, "min_temp") {
                    *min_temp = t;
                }
                if let Some(t) = attr_f64(attributes, "max_temp") {
                    *max_temp = t;
                }
            }
            Self::Gauge { value, unit, .. } => {
                if let Ok(v) = state.parse::<f64>() {
                    *value = v;
                }
                if let Some(u) = attr_str(attributes, "unit_of_measurement") {
                    *unit = u;
                }
            }
            Self::Graph {
                value,
                unit,
                history_hours,
                points,
            } => {
                if let Ok(v) = state.parse::<f64>() {
                    *value = v;
                    points.push_back(DataPoint {
                        timestamp: Utc::now(),
                        value: v,
                    });
                    let cutoff = Utc::now() - chrono::Duration::hours(*history_hours);
                    while points.front().is_some_and(|p| p.timestamp < cutoff) {
                        points.pop_front();
                    }
                }
                if let Some(u) = attr_str(attributes, "unit_of_measurement") {
                    *unit = u;
                }
            }
        }
    }

    /// Gauge fill as a percentage of its configured range.
    pub fn percentage(&self) -> Option<f64> {
        match self {
            Self::Gauge {
                value, min, max, ..
            } => {
                if max == min {
                    Some(0.0)
                } else {
                    Some((value - min) / (max - min) * 100.0)
                }
            }
            _ => None,
        }
    }
}

/// A locally mirrored smart-home entity.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Local id, stable, generated once (by the registry on first insert).
    pub id: String,
    /// Bridge-assigned id, e.g. `light.living_room`.
    pub remote_id: String,
    pub name: String,
    /// Category string: `light`, `switch`, `sensor`, ...
    pub domain: String,
    /// Raw state string as the bridge reports it.
    pub state: String,
    pub icon: String,
    /// User-assigned position in the control surface.
    pub order: u32,
    pub available: bool,
    pub last_updated: DateTime<Utc>,
    pub attributes: Map<String, Value>,
    /// Widget-level settings (gauge bounds, graph window, ...).
    pub config: HashMap<String, String>,
    pub variant: EntityVariant,
}

impl Entity {
    /// Create a fresh entity of the given kind. The local id and order
    /// are assigned by the registry when first inserted.
    pub fn new(
        kind: EntityKind,
        remote_id: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        let config = HashMap::new();
        Self {
            id: String::new(),
            remote_id: remote_id.into(),
            name: name.into(),
            domain: domain.into(),
            state: String::new(),
            icon: String::new(),
            order: 0,
            available: true,
            last_updated: Utc::now(),
            attributes: Map::new(),
            variant: EntityVariant::new(kind, &config),
            config,
        }
    }

    /// The display-type tag of this entity's variant.
    pub fn kind(&self) -> EntityKind {
        self.variant.kind()
    }

    /// Apply a new state and attribute set from the bridge.
    pub fn apply_state(&mut self, state: &str, attributes: Map<String, Value>) {
        self.state = state.to_owned();
        self.attributes = attributes;
        self.available = state != "unavailable";
        self.last_updated = Utc::now();
        self.variant.apply(&self.state, &self.attributes);
    }

    /// Display-friendly state string.
    pub fn display_state(&self) -> String {
        match &self.variant {
            EntityVariant::Toggle { on } => (if *on { "ON" } else { "OFF" }).into(),
            EntityVariant::Sensor { value, unit } | EntityVariant::Graph { value, unit, .. } => {
                format!("{value:.1} {unit}")
            }
            EntityVariant::Light { on, brightness, .. } => {
                if *on {
                    format!("ON ({}%)", u32::from(*brightness) * 100 / 255)
                } else {
                    "OFF".into()
                }
            }
            EntityVariant::Climate {
                current,
                target,
                hvac_mode,
                ..
            } => format!("{current:.1} -> {target:.1} ({hvac_mode})"),
            EntityVariant::Gauge { value, unit, .. } => format!("{value:.1} {unit}"),
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Rebuild an entity from its persisted record. Returns `None` for an
    /// unrecognized display type (the caller logs and skips the record).
    pub fn from_record(record: EntityRecord) -> Option<Self> {
        let kind: EntityKind = record.display_type.parse().ok()?;
        let mut variant = EntityVariant::new(kind, &record.config);
        variant.apply(&record.state, &record.attributes);

        Some(Self {
            id: record.id,
            remote_id: record.entity_id,
            name: record.name,
            domain: record.domain,
            available: record.state != "unavailable",
            state: record.state,
            icon: record.icon,
            order: record.order,
            last_updated: Utc::now(),
            attributes: record.attributes,
            config: record.config,
            variant,
        })
    }

    /// Flatten into the persisted record shape.
    pub fn to_record(&self) -> EntityRecord {
        EntityRecord {
            id: self.id.clone(),
            entity_id: self.remote_id.clone(),
            name: self.name.clone(),
            domain: self.domain.clone(),
            state: self.state.clone(),
            icon: self.icon.clone(),
            display_type: self.kind().to_string(),
            order: self.order,
            attributes: self.attributes.clone(),
            config: self.config.clone(),
        }
    }
}

/// Flat serialized form of an [`Entity`], one element of the persisted
/// JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    pub entity_id: String,
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub icon: String,
    pub display_type: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

// ── Attribute access helpers ─────────────────────────────────────────

fn attr_str(attributes: &Map<String, Value>, key: &str) -> Option<String> {
    attributes.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Numeric attribute, tolerating both JSON numbers and numeric strings.
fn attr_f64(attributes: &Map<String, Value>, key: &str) -> Option<f64> {
    match attributes.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn attr_rgb(attributes: &Map<String, Value>) -> Option<[u8; 3]> {
    let arr = attributes.get("rgb_color")?.as_array()?;
    if arr.len() < 3 {
        return None;
    }
    let mut rgb = [0u8; 3];
    for (slot, value) in rgb.iter_mut().zip(arr) {
        *slot = value.as_f64()?.clamp(0.0, 255.0) as u8;
    }
    Some(rgb)
}

fn config_f64(config: &HashMap<String, String>, key: &str) -> Option<f64> {
    config.get(key)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn toggle_derives_on_flag() {
        let mut entity = Entity::new(EntityKind::Toggle, "switch.fan", "Fan", "switch");
        entity.apply_state("on", Map::new());
        assert!(matches!(entity.variant, EntityVariant::Toggle { on: true }));
        assert_eq!(entity.display_state(), "ON");

        entity.apply_state("off", Map::new());
        assert!(matches!(entity.variant, EntityVariant::Toggle { on: false }));
        assert_eq!(entity.display_state(), "OFF");
    }

    #[test]
    fn sensor_parses_value_and_unit() {
        let mut entity = Entity::new(EntityKind::Sensor, "sensor.temp", "Temp", "sensor");
        entity.apply_state("21.4", attrs(json!({ "unit_of_measurement": "°C" })));

        match &entity.variant {
            EntityVariant::Sensor { value, unit } => {
                assert_eq!(*value, 21.4);
                assert_eq!(unit, "°C");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn sensor_keeps_last_value_on_unparseable_state() {
        let mut entity = Entity::new(EntityKind::Sensor, "sensor.temp", "Temp", "sensor");
        entity.apply_state("21.4", Map::new());
        entity.apply_state("unknown", Map::new());

        match &entity.variant {
            EntityVariant::Sensor { value, .. } => assert_eq!(*value, 21.4),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn light_derives_brightness_and_color() {
        let mut entity = Entity::new(EntityKind::Light, "light.lr", "Living Room", "light");
        entity.apply_state(
            "on",
            attrs(json!({ "brightness": 128, "rgb_color": [255, 120, 0] })),
        );

        match &entity.variant {
            EntityVariant::Light {
                on,
                brightness,
                rgb,
            } => {
                assert!(on);
                assert_eq!(*brightness, 128);
                assert_eq!(*rgb, [255, 120, 0]);
            }
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(entity.display_state(), "ON (50%)");
    }

    #[test]
    fn light_ignores_malformed_color() {
        let mut entity = Entity::new(EntityKind::Light, "light.lr", "Living Room", "light");
        entity.apply_state("on", attrs(json!({ "rgb_color": "nope" })));

        match &entity.variant {
            EntityVariant::Light { rgb, .. } => assert_eq!(*rgb, [255, 255, 255]),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn climate_derives_temperatures_and_mode() {
        let mut entity = Entity::new(EntityKind::Climate, "climate.lr", "Thermostat", "climate");
        entity.apply_state(
            "heat",
            attrs(json!({
                "current_temperature": 19.5,
                "temperature": 21.0,
                "hvac_action": "heating",
                "min_temp": 10.0,
                "max_temp": 28.0,
            })),
        );

        match &entity.variant {
            EntityVariant::Climate {
                current,
                target,
                hvac_mode,
                hvac_action,
                min_temp,
                max_temp,
            } => {
                assert_eq!(*current, 19.5);
                assert_eq!(*target, 21.0);
                assert_eq!(hvac_mode, "heat");
                assert_eq!(hvac_action, "heating");
                assert_eq!(*min_temp, 10.0);
                assert_eq!(*max_temp, 28.0);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn gauge_reads_bounds_from_config_and_computes_percentage() {
        let mut entity = Entity::new(EntityKind::Gauge, "sensor.hum", "Humidity", "sensor");
        entity.config.insert("min".into(), "20".into());
        entity.config.insert("max".into(), "80".into());
        entity.variant = EntityVariant::new(EntityKind::Gauge, &entity.config);

        entity.apply_state("50", Map::new());
        assert_eq!(entity.variant.percentage(), Some(50.0));
    }

    #[test]
    fn gauge_degenerate_range_is_zero_percent() {
        let config = HashMap::from([("min".into(), "5".into()), ("max".into(), "5".into())]);
        let mut variant = EntityVariant::new(EntityKind::Gauge, &config);
        variant.apply("5", &Map::new());
        assert_eq!(variant.percentage(), Some(0.0));
    }

    #[test]
    fn graph_accumulates_and_prunes_points() {
        let mut entity = Entity::new(EntityKind::Graph, "sensor.temp", "Temp", "sensor");
        entity.apply_state("20.0", Map::new());
        entity.apply_state("21.0", Map::new());

        match &mut entity.variant {
            EntityVariant::Graph { points, .. } => {
                assert_eq!(points.len(), 2);
                // Age the first point past the retention window.
                points[0].timestamp = Utc::now() - chrono::Duration::hours(48);
            }
            other => panic!("wrong variant: {other:?}"),
        }

        entity.apply_state("22.0", Map::new());
        match &entity.variant {
            EntityVariant::Graph { points, value, .. } => {
                assert_eq!(*value, 22.0);
                assert_eq!(points.len(), 2, "stale point should be pruned");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unavailable_state_clears_availability() {
        let mut entity = Entity::new(EntityKind::Toggle, "switch.fan", "Fan", "switch");
        entity.apply_state("unavailable", Map::new());
        assert!(!entity.available);

        entity.apply_state("off", Map::new());
        assert!(entity.available);
    }

    #[test]
    fn record_round_trip_preserves_identity_and_variant() {
        let mut entity = Entity::new(EntityKind::Light, "light.lr", "Living Room", "light");
        entity.id = "abc-123".into();
        entity.order = 3;
        entity.icon = "mdi:lamp".into();
        entity.apply_state("on", attrs(json!({ "brightness": 200 })));

        let record = entity.to_record();
        assert_eq!(record.display_type, "light");
        assert_eq!(record.entity_id, "light.lr");

        let restored = Entity::from_record(record).unwrap();
        assert_eq!(restored.id, "abc-123");
        assert_eq!(restored.remote_id, "light.lr");
        assert_eq!(restored.order, 3);
        assert_eq!(restored.kind(), EntityKind::Light);
        match &restored.variant {
            EntityVariant::Light { on, brightness, .. } => {
                assert!(on);
                assert_eq!(*brightness, 200);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn record_with_unknown_display_type_is_rejected() {
        let record = EntityRecord {
            id: "x".into(),
            entity_id: "camera.door".into(),
            name: "Door".into(),
            domain: "camera".into(),
            state: "idle".into(),
            icon: String::new(),
            display_type: "hologram".into(),
            order: 0,
            attributes: Map::new(),
            config: HashMap::new(),
        };
        assert!(Entity::from_record(record).is_none());
    }

    #[test]
    fn record_serializes_camel_case() {
        let entity = Entity::new(EntityKind::Sensor, "sensor.temp", "Temp", "sensor");
        let value = serde_json::to_value(entity.to_record()).unwrap();
        assert!(value.get("entityId").is_some());
        assert!(value.get("displayType").is_some());
    }

    #[test]
    fn tracked_attributes_follow_variant() {
        let light = EntityVariant::new(EntityKind::Light, &HashMap::new());
        assert!(light.tracked_attributes().contains(&"brightness"));

        let toggle = EntityVariant::new(EntityKind::Toggle, &HashMap::new());
        assert!(toggle.tracked_attributes().is_empty());
    }
}
