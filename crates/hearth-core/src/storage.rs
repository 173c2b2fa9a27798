// ── Entity persistence ──
//
// The registry persists its full record set through this contract:
// load-or-empty on a missing file, full rewrite on every save. Entity
// counts are small, so whole-file rewrites are the simplest thing that
// cannot leave a partially merged store behind.

use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use crate::model::EntityRecord;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid store contents: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where the registry keeps its records.
pub trait EntityStore: Send + Sync {
    /// Read every record. A missing file is an empty store, not an error.
    fn load(&self) -> Result<Vec<EntityRecord>, StorageError>;

    /// Replace the store contents with exactly these records.
    fn save(&self, records: &[EntityRecord]) -> Result<(), StorageError>;
}

// ── JSON file store ──────────────────────────────────────────────────

/// The on-disk store: one JSON array of flat entity records.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl EntityStore for JsonFileStore {
    fn load(&self) -> Result<Vec<EntityRecord>, StorageError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no entity store file, starting empty");
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, records: &[EntityRecord]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), count = records.len(), "entity store saved");
        Ok(())
    }
}

// ── In-memory store ──────────────────────────────────────────────────

/// Volatile store for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<EntityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    fn load(&self) -> Result<Vec<EntityRecord>, StorageError> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn save(&self, records: &[EntityRecord]) -> Result<(), StorageError> {
        *self.records.lock().unwrap() = records.to_vec();
        Ok(())
    }
}
