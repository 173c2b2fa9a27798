// ── Core error types ──
//
// User-facing errors from hearth-core. Transport failures are absorbed
// into the best-effort bridge contract long before they reach consumers;
// what remains here is the small set of conditions a caller can act on.

use thiserror::Error;

use crate::storage::StorageError;

/// Error type shared across the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Scene not found: {id}")]
    SceneNotFound { id: String },

    #[error("Entity not found: {id}")]
    EntityNotFound { id: String },

    #[error("Automation not found: {id}")]
    AutomationNotFound { id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Bridge API error: {message}")]
    Api { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hearth_api::Error> for CoreError {
    fn from(err: hearth_api::Error) -> Self {
        match err {
            hearth_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            other => CoreError::Api {
                message: other.to_string(),
            },
        }
    }
}

impl From<url::ParseError> for CoreError {
    fn from(err: url::ParseError) -> Self {
        CoreError::Config {
            message: format!("Invalid URL: {err}"),
        }
    }
}
