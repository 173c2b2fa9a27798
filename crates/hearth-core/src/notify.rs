// ── Notification collaborator ──
//
// Fire-and-forget: nothing in this crate consults a return value or
// waits on delivery. Platform delivery lives outside the core; the
// default implementation just logs.

use tracing::info;

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    /// A notification pushed by the bridge.
    fn notify(&self, title: &str, body: &str);

    /// A locally observed entity state change worth surfacing.
    fn entity_state_changed(&self, entity_name: &str, new_state: &str);
}

/// Default notifier: structured log lines, no platform delivery.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notification");
    }

    fn entity_state_changed(&self, entity_name: &str, new_state: &str) {
        info!(entity = entity_name, state = new_state, "entity state changed");
    }
}
