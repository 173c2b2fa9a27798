// Shared transport configuration for building reqwest::Client instances.
//
// The command client and connectivity probes share timeout and credential
// settings through this module, avoiding duplicated builder logic.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Basic-auth credentials for the bridge.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bridge base URL (e.g. `http://192.168.1.50:8001`).
    pub base_url: Url,
    /// Path segment the bridge exposes its entity API under.
    pub integration: String,
    /// Per-request timeout. A timed-out call fails alone; it is never
    /// retried here.
    pub timeout: Duration,
    /// Basic-auth credentials, when the bridge requires them.
    pub credentials: Option<Credentials>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".parse().unwrap(),
            integration: "homeassistant".into(),
            timeout: Duration::from_secs(30),
            credentials: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("hearth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(crate::error::Error::Transport)
    }
}
