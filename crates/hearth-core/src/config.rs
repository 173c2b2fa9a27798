// ── Runtime sync configuration ──
//
// Describes *how* to reach the bridge. Carries credential data and
// connection tuning, but never touches disk -- the config crate (or a
// frontend) constructs one and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use hearth_api::PushConfig;

/// Configuration for synchronizing against a single bridge.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bridge host. Empty means "not configured": the sync engine stays
    /// idle rather than erroring.
    pub host: String,
    /// Push socket port.
    pub push_port: u16,
    /// Use TLS (`wss`) for the push socket.
    pub secure: bool,
    pub username: String,
    pub password: SecretString,
    /// Client version reported in the push auth handshake.
    pub client_version: String,
    /// Enable the push socket at all.
    pub push_enabled: bool,
    /// Poll-fallback interval while push is not subscribed.
    pub poll_interval: Duration,
    /// Fixed delay before push reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            push_port: 8002,
            secure: false,
            username: String::new(),
            password: SecretString::from(String::new()),
            client_version: env!("CARGO_PKG_VERSION").into(),
            push_enabled: true,
            poll_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    /// Whether a bridge address has been configured at all.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }

    /// The push socket URL.
    pub fn push_url(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/events", self.host, self.push_port).parse()
    }

    /// Build the transport-level push configuration.
    pub fn push_config(&self) -> Result<PushConfig, url::ParseError> {
        Ok(PushConfig {
            url: self.push_url()?,
            username: self.username.clone(),
            password: self.password.clone(),
            client_version: self.client_version.clone(),
            reconnect_delay: self.reconnect_delay,
        })
    }
}
