//! Persisted script state.
//!
//! One opaque text blob per user. The script decides the format; the host
//! only reads and writes it on request. A missing file means "no state yet".

use super::CollabError;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage for the script's state blob.
pub trait StateStore: Send + Sync {
    /// Reads the blob; `Ok(None)` if nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::Io`] if the store exists but cannot be read.
    fn load(&self) -> Result<Option<String>, CollabError>;

    /// Replaces the blob.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::Io`] if the blob cannot be written.
    fn save(&self, text: &str) -> Result<(), CollabError>;
}

/// State stored in a single file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<String>, CollabError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, text: &str) -> Result<(), CollabError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

/// In-process state, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    blob: Mutex<Option<String>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<String>, CollabError> {
        Ok(self.blob.lock().clone())
    }

    fn save(&self, text: &str) -> Result<(), CollabError> {
        *self.blob.lock() = Some(text.to_string());
        Ok(())
    }
}
