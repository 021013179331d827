use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use eino_shared::Conversation;

use crate::error::StorageError;

/// Fixed name of the blob holding every conversation.
pub const STORAGE_KEY: &str = "eino_conversations_v1";

/// Reads and writes the whole conversation list as a single blob.
pub trait ConversationStorage {
    /// Never fails: missing or unreadable data yields an empty list.
    fn load(&self) -> Vec<Conversation>;

    /// Overwrites the stored blob with `conversations`.
    fn save(&self, conversations: &[Conversation]) -> Result<(), StorageError>;
}

fn decode(blob: &str) -> Vec<Conversation> {
    match serde_json::from_str::<Option<Vec<Conversation>>>(blob) {
        Ok(conversations) => conversations.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Discarding unreadable conversation data: {}", e);
            Vec::new()
        }
    }
}

/// Stores the blob as `<dir>/eino_conversations_v1.json`.
#[derive(Clone, Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    /// Platform data directory, e.g. `~/.local/share/eino`.
    pub fn default_dir() -> Result<PathBuf, StorageError> {
        let base = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
        Ok(base.join("eino"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationStorage for JsonFileStorage {
    fn load(&self) -> Vec<Conversation> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => decode(&blob),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Could not read {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let blob = serde_json::to_string(conversations)?;
        fs::write(&self.path, blob)?;
        Ok(())
    }
}

/// Keeps the blob in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: RefCell<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the storage with raw text, which may be corrupt.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: RefCell::new(Some(blob.into())),
        }
    }
}

impl ConversationStorage for MemoryStorage {
    fn load(&self) -> Vec<Conversation> {
        self.blob.borrow().as_deref().map(decode).unwrap_or_default()
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StorageError> {
        *self.blob.borrow_mut() = Some(serde_json::to_string(conversations)?);
        Ok(())
    }
}
