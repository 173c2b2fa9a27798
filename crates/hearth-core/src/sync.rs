// ── Sync orchestrator ──
//
// Keeps the local registry consistent with the bridge. Push is
// authoritative while subscribed; the poll fallback covers every gap.
// Both paths feed the same compare-before-mutate update routine, so
// consumers cannot distinguish the origin of a change event and
// duplicates are suppressed regardless of transport.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hearth_api::{PushEvent, PushState, PushTransport, RemoteEntity};

use crate::bridge::BridgeApi;
use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::model::{ChangeEvent, Entity, EntityKind};
use crate::notify::Notifier;
use crate::registry::EntityRegistry;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Orchestrates push, poll, and the entity registry.
///
/// Cheaply cloneable via `Arc`; background tasks hold clones.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: SyncConfig,
    registry: Arc<EntityRegistry>,
    bridge: Arc<dyn BridgeApi>,
    notifier: Arc<dyn Notifier>,
    events_tx: broadcast::Sender<ChangeEvent>,
    push_state: Arc<watch::Sender<PushState>>,
    push: tokio::sync::Mutex<Option<Arc<PushTransport>>>,
    cancel: CancellationToken,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        registry: Arc<EntityRegistry>,
        bridge: Arc<dyn BridgeApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (push_state, _) = watch::channel(PushState::Disconnected);

        Self {
            inner: Arc::new(SyncInner {
                config,
                registry,
                bridge,
                notifier,
                events_tx,
                push_state: Arc::new(push_state),
                push: tokio::sync::Mutex::new(None),
                cancel: CancellationToken::new(),
                handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.inner.registry
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to normalized change events.
    pub fn events(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.events_tx.subscribe()
    }

    /// The event feed as a `Stream` for combinator-style consumers.
    pub fn event_stream(&self) -> BroadcastStream<ChangeEvent> {
        BroadcastStream::new(self.events())
    }

    /// Subscribe to push connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<PushState> {
        self.inner.push_state.subscribe()
    }

    /// Whether push is currently the authoritative transport.
    pub fn push_subscribed(&self) -> bool {
        *self.inner.push_state.borrow() == PushState::Subscribed
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load the registry, connect push (when enabled), start the poll
    /// fallback.
    ///
    /// Without a configured bridge address this is a successful no-op:
    /// the engine stays idle rather than erroring.
    pub async fn start(&self) -> Result<(), CoreError> {
        if !self.inner.config.is_configured() {
            info!("bridge address not configured, sync engine idle");
            return Ok(());
        }

        self.inner.registry.load();

        if self.inner.config.push_enabled {
            let push_config = self.inner.config.push_config()?;
            let transport = Arc::new(PushTransport::new(
                push_config,
                Arc::clone(&self.inner.push_state),
            ));

            // A failed first connect is not fatal: the poll fallback
            // carries sync until someone reconnects.
            if let Err(e) = transport.connect().await {
                warn!(error = %e, "initial push connect failed, relying on poll fallback");
            }

            let events = transport.events();
            *self.inner.push.lock().await = Some(Arc::clone(&transport));
            self.inner
                .handles
                .lock()
                .await
                .push(tokio::spawn(pump_task(self.clone(), events)));
        }

        self.inner
            .handles
            .lock()
            .await
            .push(tokio::spawn(poll_task(self.clone())));

        info!("sync engine started");
        Ok(())
    }

    /// Stop the poll fallback, disconnect push, persist the registry.
    ///
    /// No callback is in flight once this returns.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        {
            let mut handles = self.inner.handles.lock().await;
            for handle in handles.drain(..) {
                let _ = handle.await;
            }
        }
        if let Some(push) = self.inner.push.lock().await.take() {
            push.disconnect().await;
        }
        self.inner.registry.save();
        info!("sync engine stopped");
    }

    /// Ask the push transport to reconnect (disconnect, backoff,
    /// connect). No-op when push is disabled or not started.
    pub async fn reconnect_push(&self) -> Result<(), CoreError> {
        let push = self.inner.push.lock().await.clone();
        if let Some(push) = push {
            push.reconnect().await?;
        }
        Ok(())
    }

    // ── Poll fallback ────────────────────────────────────────────────

    /// One poll cycle: list remote entities and diff them against the
    /// registry. Only entities already present locally are updated; a
    /// change event is emitted only when state or a tracked attribute
    /// actually differs.
    pub async fn poll_once(&self) {
        let remotes = self.inner.bridge.list_entities().await;
        let mut changed = 0usize;

        for remote in remotes {
            if self.inner.registry.get_by_remote(&remote.entity_id).is_none() {
                continue;
            }
            if let Some(event) =
                self.inner
                    .registry
                    .apply_state(&remote.entity_id, &remote.state, remote.attributes)
            {
                changed += 1;
                let _ = self.inner.events_tx.send(event);
            }
        }

        if changed > 0 {
            debug!(changed, "poll applied entity updates");
        }
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Create a local entity from a bridge listing (the manual-add /
    /// discovery flow) and store it.
    pub fn import_remote(&self, remote: &RemoteEntity, kind: EntityKind) -> Entity {
        let name = if remote.friendly_name.is_empty() {
            remote.entity_id.clone()
        } else {
            remote.friendly_name.clone()
        };
        let domain = if remote.domain.is_empty() {
            remote
                .entity_id
                .split('.')
                .next()
                .unwrap_or_default()
                .to_owned()
        } else {
            remote.domain.clone()
        };

        let mut entity = Entity::new(kind, &remote.entity_id, name, domain);
        entity.apply_state(&remote.state, remote.attributes.clone());
        self.inner.registry.upsert(entity)
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Apply push events to the registry and re-emit normalized change
/// events; route notifications to the notifier.
async fn pump_task(engine: SyncEngine, mut events: broadcast::Receiver<PushEvent>) {
    let cancel = engine.inner.cancel.clone();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(PushEvent::StateChanged { entity_id, state }) => {
                    let applied = engine.inner.registry.apply_state(
                        &entity_id,
                        &state.state,
                        state.attributes,
                    );
                    if let Some(event) = applied {
                        if let ChangeEvent::StateChanged { new_state, .. } = &event {
                            if let Some(entity) = engine.inner.registry.get_by_remote(&entity_id) {
                                engine.inner.notifier.entity_state_changed(&entity.name, new_state);
                            }
                        }
                        let _ = engine.inner.events_tx.send(event);
                    }
                }
                Ok(PushEvent::Notification { title, body, .. }) => {
                    engine.inner.notifier.notify(&title, &body);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push event pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Poll on a fixed interval whenever push is not subscribed.
async fn poll_task(engine: SyncEngine) {
    let cancel = engine.inner.cancel.clone();
    let mut interval = tokio::time::interval(engine.inner.config.poll_interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if engine.push_subscribed() {
                    // Push is authoritative; self-disable until it drops.
                    continue;
                }
                engine.poll_once().await;
            }
        }
    }
}
