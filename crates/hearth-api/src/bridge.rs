// Bridge HTTP command client
//
// Wraps `reqwest::Client` with bridge-specific URL construction and
// response handling. Each method is a single request/response; retry
// policy belongs to callers.

use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{Credentials, TransportConfig};

/// An entity as the bridge reports it in list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub entity_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
}

/// A single entity's full state as reported by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteState {
    pub entity_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

/// JSON body for `POST /{integration}/command`.
#[derive(Debug, Serialize)]
struct CommandBody<'a> {
    entity_id: &'a str,
    command: &'a str,
    parameters: &'a serde_json::Map<String, Value>,
}

/// Raw HTTP client for the bridge's command API.
///
/// All methods return typed `Result`s; the core crate adapts them to its
/// best-effort contract. A timed-out or failed call affects that call
/// only -- the client itself carries no connection state.
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: Url,
    integration: String,
    credentials: Option<Credentials>,
}

impl BridgeClient {
    /// Create a new client from a [`TransportConfig`].
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            integration: config.integration.clone(),
            credentials: config.credentials.clone(),
        })
    }

    /// The bridge base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a bridge API path.
    fn url(&self, path: &str) -> Result<Url, Error> {
        let full = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        Ok(Url::parse(&full)?)
    }

    /// Build an integration-scoped URL: `{base}/{integration}/{path}`.
    fn integration_url(&self, path: &str) -> Result<Url, Error> {
        self.url(&format!("{}/{}", self.integration, path))
    }

    // ── API surface ──────────────────────────────────────────────────

    /// Probe bridge connectivity: `GET /status`.
    ///
    /// Returns `Ok(false)` for a reachable bridge answering non-success;
    /// transport failures are `Err`.
    pub async fn status(&self) -> Result<bool, Error> {
        let url = self.url("status")?;
        debug!("GET {url}");
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        Ok(resp.status().is_success())
    }

    /// List every entity the bridge exposes: `GET /{integration}/entities`.
    pub async fn list_entities(&self) -> Result<Vec<RemoteEntity>, Error> {
        let url = self.integration_url("entities")?;
        debug!("GET {url}");
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        self.parse_body(resp).await
    }

    /// Fetch one entity's state: `GET /{integration}/state/{id}`.
    pub async fn state(&self, remote_id: &str) -> Result<RemoteState, Error> {
        let url = self.integration_url(&format!("state/{remote_id}"))?;
        debug!("GET {url}");
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        self.parse_body(resp).await
    }

    /// Send a command to an entity: `POST /{integration}/command`.
    pub async fn command(
        &self,
        entity_id: &str,
        command: &str,
        parameters: &serde_json::Map<String, Value>,
    ) -> Result<(), Error> {
        let url = self.integration_url("command")?;
        debug!("POST {url} ({entity_id}: {command})");

        let body = CommandBody {
            entity_id,
            command,
            parameters,
        };
        let resp = self
            .request(reqwest::Method::POST, url.clone())
            .json(&body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            })
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Start a request builder with credentials applied when configured.
    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(creds) = &self.credentials {
            builder = builder.basic_auth(&creds.username, Some(creds.password.expose_secret()));
        }
        builder
    }

    /// Check the status code, then deserialize the response body.
    async fn parse_body<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let url = resp.url().to_string();

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
