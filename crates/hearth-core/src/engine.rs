// ── Automation engine ──
//
// Evaluates trigger/condition/action rules against change events and a
// minute ticker. Evaluation snapshots the rule set under the lock and
// runs without it: an automation added concurrently may or may not see
// the in-flight event, already-loaded ones always do.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::BridgeApi;
use crate::commands::command_for_state;
use crate::model::{Action, Automation, ChangeEvent, Condition};
use crate::registry::EntityRegistry;
use crate::scenes::SceneApplier;

/// Default ticker period for time-of-day triggers.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// The rule engine.
///
/// Cheaply cloneable via `Arc`; background tasks hold clones.
#[derive(Clone)]
pub struct AutomationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    automations: Mutex<HashMap<String, Automation>>,
    registry: Arc<EntityRegistry>,
    bridge: Arc<dyn BridgeApi>,
    scenes: Arc<SceneApplier>,
    cancel: CancellationToken,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    pub fn new(
        registry: Arc<EntityRegistry>,
        bridge: Arc<dyn BridgeApi>,
        scenes: Arc<SceneApplier>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                automations: Mutex::new(HashMap::new()),
                registry,
                bridge,
                scenes,
                cancel: CancellationToken::new(),
                handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Automation set ───────────────────────────────────────────────

    /// Insert or replace an automation. A new automation (empty id) gets
    /// a generated one. Returns the stored automation.
    pub fn add(&self, mut automation: Automation) -> Automation {
        if automation.id.is_empty() {
            automation.id = Uuid::new_v4().to_string();
        }
        let stored = automation.clone();
        self.inner
            .automations
            .lock()
            .unwrap()
            .insert(automation.id.clone(), automation);
        stored
    }

    pub fn remove(&self, id: &str) -> bool {
        self.inner.automations.lock().unwrap().remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<Automation> {
        self.inner.automations.lock().unwrap().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Automation> {
        let mut automations: Vec<Automation> = self
            .inner
            .automations
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        automations.sort_by(|a, b| a.name.cmp(&b.name));
        automations
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the event loop and the time ticker.
    pub async fn start(
        &self,
        events: broadcast::Receiver<ChangeEvent>,
        tick_interval: Duration,
    ) {
        let mut handles = self.inner.handles.lock().await;
        if !handles.is_empty() {
            warn!("automation engine already running");
            return;
        }
        handles.push(tokio::spawn(event_loop(self.clone(), events)));
        handles.push(tokio::spawn(ticker(self.clone(), tick_interval)));
        info!("automation engine started");
    }

    /// Cancel and join the background tasks. No evaluation is in flight
    /// once this returns.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("automation engine stopped");
    }

    // ── Evaluation ───────────────────────────────────────────────────

    /// Evaluate one event against the current rule set.
    ///
    /// Public so tests can drive time triggers without wall-clock waits.
    /// A qualifying automation fires exactly once per event: stats are
    /// updated first, then actions run in list order, each failure
    /// logged and skipped.
    pub async fn handle_event(&self, event: &ChangeEvent) {
        // Snapshot under the lock, evaluate without it.
        let snapshot: Vec<Automation> = self
            .inner
            .automations
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();

        let qualifying: Vec<Automation> = snapshot
            .into_iter()
            .filter(|a| a.matches(event))
            .filter(|a| a.conditions.iter().all(|c| self.condition_met(c)))
            .collect();
        if qualifying.is_empty() {
            return;
        }

        {
            let mut map = self.inner.automations.lock().unwrap();
            for automation in &qualifying {
                if let Some(stored) = map.get_mut(&automation.id) {
                    stored.trigger_count += 1;
                    stored.last_triggered = Some(Utc::now());
                }
            }
        }

        for automation in &qualifying {
            info!(automation = %automation.name, "automation triggered");
            for action in &automation.actions {
                self.execute_action(action).await;
            }
        }
    }

    /// Conditions read the registry's *current* state, not the event.
    fn condition_met(&self, condition: &Condition) -> bool {
        match condition {
            Condition::EntityState { entity_id, state } => self
                .inner
                .registry
                .get_by_remote(entity_id)
                .is_some_and(|e| e.state == *state),
        }
    }

    async fn execute_action(&self, action: &Action) {
        match action {
            Action::SetState {
                entity_id,
                state,
                attributes,
            } => {
                let command = command_for_state(state);
                let sent = self
                    .inner
                    .bridge
                    .send_command(entity_id, command, attributes.clone())
                    .await;
                if !sent {
                    warn!(entity = %entity_id, command, "automation action failed");
                }
            }
            Action::Scene { scene_id } => {
                if let Err(e) = self.inner.scenes.activate(scene_id).await {
                    warn!(error = %e, scene_id = %scene_id, "automation scene action failed");
                }
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn event_loop(engine: AutomationEngine, mut events: broadcast::Receiver<ChangeEvent>) {
    let cancel = engine.inner.cancel.clone();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => engine.handle_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "automation event loop lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Emit one time-kind event per tick for time-of-day triggers.
async fn ticker(engine: AutomationEngine, interval: Duration) {
    let cancel = engine.inner.cancel.clone();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let event = ChangeEvent::TimeTick { time: Local::now().time() };
                engine.handle_event(&event).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, EntityKind, Scene, Trigger};
    use crate::storage::MemoryStore;
    use crate::test_support::FakeBridge;
    use chrono::NaiveTime;
    use serde_json::Map;

    struct Fixture {
        engine: AutomationEngine,
        bridge: Arc<FakeBridge>,
        registry: Arc<EntityRegistry>,
        scenes: Arc<SceneApplier>,
    }

    fn fixture() -> Fixture {
        let bridge = Arc::new(FakeBridge::new());
        let registry = Arc::new(EntityRegistry::new(Box::new(MemoryStore::new())));
        let scenes = Arc::new(SceneApplier::new(bridge.clone()));
        let engine = AutomationEngine::new(registry.clone(), bridge.clone(), scenes.clone());
        Fixture {
            engine,
            bridge,
            registry,
            scenes,
        }
    }

    fn motion_event(old: &str, new: &str) -> ChangeEvent {
        ChangeEvent::StateChanged {
            entity_id: "binary_sensor.motion".into(),
            old_state: Some(old.into()),
            new_state: new.into(),
            attributes: Map::new(),
        }
    }

    #[tokio::test]
    async fn motion_trigger_sends_exactly_one_turn_on() {
        let f = fixture();
        f.engine.add(Automation::simple(
            "motion light",
            "binary_sensor.motion",
            "on",
            "light.living_room",
            "on",
        ));

        f.engine.handle_event(&motion_event("off", "on")).await;

        let commands = f.bridge.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, "light.living_room");
        assert_eq!(commands[0].1, "turn_on");
    }

    #[tokio::test]
    async fn two_matching_triggers_fire_once_per_event() {
        let f = fixture();
        let mut automation = Automation::new("double trigger");
        automation.triggers.push(Trigger::State {
            entity_id: "binary_sensor.motion".into(),
            from_state: None,
            to_state: Some("on".into()),
        });
        automation.triggers.push(Trigger::State {
            entity_id: "binary_sensor.motion".into(),
            from_state: Some("off".into()),
            to_state: None,
        });
        automation.actions.push(Action::SetState {
            entity_id: "light.hall".into(),
            state: "on".into(),
            attributes: Map::new(),
        });
        let stored = f.engine.add(automation);

        f.engine.handle_event(&motion_event("off", "on")).await;

        assert_eq!(f.bridge.commands().len(), 1);
        assert_eq!(f.engine.get(&stored.id).unwrap().trigger_count, 1);
    }

    #[tokio::test]
    async fn condition_gates_until_entity_reaches_state() {
        let f = fixture();
        f.registry
            .upsert(Entity::new(EntityKind::Toggle, "switch.armed", "Armed", "switch"));
        f.registry.apply_state("switch.armed", "off", Map::new());

        let mut automation = Automation::simple(
            "guarded",
            "binary_sensor.motion",
            "on",
            "light.living_room",
            "on",
        );
        automation.conditions.push(Condition::EntityState {
            entity_id: "switch.armed".into(),
            state: "on".into(),
        });
        f.engine.add(automation);

        f.engine.handle_event(&motion_event("off", "on")).await;
        assert!(f.bridge.commands().is_empty(), "condition must gate");

        f.registry.apply_state("switch.armed", "on", Map::new());
        f.engine.handle_event(&motion_event("off", "on")).await;
        assert_eq!(f.bridge.commands().len(), 1);
    }

    #[tokio::test]
    async fn failing_action_does_not_stop_the_rest() {
        let f = fixture();
        f.bridge.fail_entity("light.b");

        let mut automation = Automation::new("three actions");
        automation.triggers.push(Trigger::State {
            entity_id: "binary_sensor.motion".into(),
            from_state: None,
            to_state: Some("on".into()),
        });
        for entity in ["light.a", "light.b", "light.c"] {
            automation.actions.push(Action::SetState {
                entity_id: entity.into(),
                state: "on".into(),
                attributes: Map::new(),
            });
        }
        let stored = f.engine.add(automation);

        f.engine.handle_event(&motion_event("off", "on")).await;

        let targets: Vec<String> = f.bridge.commands().iter().map(|(e, _, _)| e.clone()).collect();
        assert_eq!(targets, ["light.a", "light.b", "light.c"]);
        assert_eq!(
            f.engine.get(&stored.id).unwrap().trigger_count,
            1,
            "stats update exactly once despite the failure"
        );
    }

    #[tokio::test]
    async fn scene_action_delegates_to_the_applier() {
        let f = fixture();
        let mut scene = Scene::new("Evening");
        scene.set_entity_state("light.a", "on", Map::new());
        let scene = f.scenes.add(scene);

        let mut automation = Automation::new("evening scene");
        automation.triggers.push(Trigger::State {
            entity_id: "binary_sensor.motion".into(),
            from_state: None,
            to_state: Some("on".into()),
        });
        automation.actions.push(Action::Scene {
            scene_id: scene.id.clone(),
        });
        f.engine.add(automation);

        f.engine.handle_event(&motion_event("off", "on")).await;

        assert!(
            f.bridge
                .commands()
                .iter()
                .any(|(e, c, _)| e == "light.a" && c == "turn_on")
        );
        assert!(f.scenes.get(&scene.id).unwrap().active);
    }

    #[tokio::test]
    async fn time_trigger_fires_on_tick() {
        let f = fixture();
        let mut automation = Automation::new("wakeup");
        automation.triggers.push(Trigger::Time {
            at: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
        });
        automation.actions.push(Action::SetState {
            entity_id: "light.bedroom".into(),
            state: "on".into(),
            attributes: Map::new(),
        });
        f.engine.add(automation);

        let miss = ChangeEvent::TimeTick {
            time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        f.engine.handle_event(&miss).await;
        assert!(f.bridge.commands().is_empty());

        let hit = ChangeEvent::TimeTick {
            time: NaiveTime::from_hms_opt(7, 30, 20).unwrap(),
        };
        f.engine.handle_event(&hit).await;
        assert_eq!(f.bridge.commands().len(), 1);
    }

    #[tokio::test]
    async fn disabled_automation_never_fires() {
        let f = fixture();
        let mut automation = Automation::simple(
            "off switch",
            "binary_sensor.motion",
            "on",
            "light.living_room",
            "on",
        );
        automation.enabled = false;
        f.engine.add(automation);

        f.engine.handle_event(&motion_event("off", "on")).await;
        assert!(f.bridge.commands().is_empty());
    }

    #[tokio::test]
    async fn stats_record_firing() {
        let f = fixture();
        let stored = f.engine.add(Automation::simple(
            "motion light",
            "binary_sensor.motion",
            "on",
            "light.living_room",
            "on",
        ));
        assert!(f.engine.get(&stored.id).unwrap().last_triggered.is_none());

        f.engine.handle_event(&motion_event("off", "on")).await;
        f.engine.handle_event(&motion_event("off", "on")).await;

        let after = f.engine.get(&stored.id).unwrap();
        assert_eq!(after.trigger_count, 2);
        assert!(after.last_triggered.is_some());
    }

    #[tokio::test]
    async fn runs_off_a_broadcast_event_feed() {
        let f = fixture();
        f.engine.add(Automation::simple(
            "motion light",
            "binary_sensor.motion",
            "on",
            "light.living_room",
            "on",
        ));

        let (tx, rx) = broadcast::channel(16);
        f.engine.start(rx, Duration::from_secs(3600)).await;

        tx.send(motion_event("off", "on")).unwrap();

        // Wait for the event loop to drain the event.
        for _ in 0..100 {
            if !f.bridge.commands().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        f.engine.stop().await;

        assert_eq!(f.bridge.commands().len(), 1);
    }
}
