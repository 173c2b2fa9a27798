//! Shared configuration for Hearth frontends.
//!
//! TOML file + `HEARTH_*` environment variables, resolved through
//! figment and translated into the runtime types the core and transport
//! crates consume. Frontends construct `Settings` once at startup and
//! hand the derived configs in; nothing below this crate reads disk or
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hearth_api::{Credentials, TransportConfig};
use hearth_core::SyncConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

/// Where the bridge lives and how to authenticate.
#[derive(Debug, Deserialize, Serialize)]
pub struct BridgeSettings {
    /// Bridge host. Empty means unconfigured: components stay idle.
    #[serde(default)]
    pub host: String,

    /// HTTP command port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Push socket port.
    #[serde(default = "default_push_port")]
    pub push_port: u16,

    /// Use TLS for both surfaces.
    #[serde(default)]
    pub secure: bool,

    #[serde(default)]
    pub username: String,

    /// Plaintext password -- prefer `HEARTH_BRIDGE__PASSWORD`.
    #[serde(default)]
    pub password: Option<String>,

    /// Path segment the bridge exposes its entity API under.
    #[serde(default = "default_integration")]
    pub integration: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            push_port: default_push_port(),
            secure: false,
            username: String::new(),
            password: None,
            integration: default_integration(),
        }
    }
}

/// Synchronization tuning.
#[derive(Debug, Deserialize, Serialize)]
pub struct SyncSettings {
    /// Poll-fallback interval (seconds) while push is not subscribed.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Per-request HTTP timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Enable the push socket.
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,

    /// Fixed delay (seconds) before push reconnection attempts.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            push_enabled: default_push_enabled(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

/// Where the entity registry persists.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Entity store file. Defaults to `entities.json` under the platform
    /// data directory.
    #[serde(default)]
    pub entities_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    8001
}
fn default_push_port() -> u16 {
    8002
}
fn default_integration() -> String {
    "homeassistant".into()
}
fn default_poll_interval() -> u64 {
    5
}
fn default_timeout() -> u64 {
    30
}
fn default_push_enabled() -> bool {
    true
}
fn default_reconnect_delay() -> u64 {
    1
}

// ── Loading ─────────────────────────────────────────────────────────

impl Settings {
    /// Load settings: defaults, then the TOML file (when present), then
    /// `HEARTH_*` environment variables (`HEARTH_BRIDGE__HOST`, ...).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HEARTH_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Write these settings as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Platform config file location, or `./hearth.toml` when the
    /// platform directories cannot be resolved.
    pub fn default_config_path() -> PathBuf {
        ProjectDirs::from("io", "hearth-home", "hearth")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("hearth.toml"))
    }

    // ── Conversions ──────────────────────────────────────────────────

    /// Runtime configuration for the sync engine.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            host: self.bridge.host.clone(),
            push_port: self.bridge.push_port,
            secure: self.bridge.secure,
            username: self.bridge.username.clone(),
            password: SecretString::from(self.bridge.password.clone().unwrap_or_default()),
            client_version: env!("CARGO_PKG_VERSION").into(),
            push_enabled: self.sync.push_enabled,
            poll_interval: Duration::from_secs(self.sync.poll_interval_secs.max(1)),
            reconnect_delay: Duration::from_secs(self.sync.reconnect_delay_secs.max(1)),
        }
    }

    /// Transport configuration for the HTTP command client.
    pub fn transport_config(&self) -> Result<TransportConfig, ConfigError> {
        let scheme = if self.bridge.secure { "https" } else { "http" };
        let base_url = format!("{scheme}://{}:{}", self.bridge.host, self.bridge.port)
            .parse()
            .map_err(|e| ConfigError::Validation {
                field: "bridge.host".into(),
                reason: format!("{e}"),
            })?;

        let credentials = match (&self.bridge.username, &self.bridge.password) {
            (username, Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: SecretString::from(password.clone()),
            }),
            _ => None,
        };

        Ok(TransportConfig {
            base_url,
            integration: self.bridge.integration.clone(),
            timeout: Duration::from_secs(self.sync.timeout_secs.max(1)),
            credentials,
        })
    }

    /// Where the entity registry persists.
    pub fn entities_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.entities_file {
            return path.clone();
        }
        ProjectDirs::from("io", "hearth-home", "hearth")
            .map(|dirs| dirs.data_dir().join("entities.json"))
            .unwrap_or_else(|| PathBuf::from("entities.json"))
    }
}
