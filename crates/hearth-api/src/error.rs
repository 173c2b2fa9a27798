use thiserror::Error;

/// Top-level error type for the `hearth-api` crate.
///
/// Covers every failure mode across both transport surfaces: the HTTP
/// command API and the push socket. `hearth-core` maps these into its
/// best-effort boolean/option contract and never exposes them raw.
#[derive(Debug, Error)]
pub enum Error {
    // ── HTTP transport ──────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The bridge answered with a non-success status code.
    #[error("Bridge rejected request (HTTP {status}): {url}")]
    Status { status: u16, url: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Push socket ─────────────────────────────────────────────────
    /// Push socket connection failed.
    #[error("Push connection failed: {0}")]
    PushConnect(String),

    /// The bridge rejected the push authentication handshake.
    #[error("Push authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Operation requires a live push connection.
    #[error("Push transport is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::PushConnect(_) => true,
            Self::NotConnected => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}
