//! Persisted client storage for the session token.
//!
//! The file store behaves like browser local storage: a flat JSON object of
//! string keys to string values, with the token under [`TOKEN_KEY`]. Keys this
//! crate does not own are preserved on write.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;

/// Storage key holding the session token.
pub const TOKEN_KEY: &str = "token";

/// Persistence seam for the session token.
pub trait TokenStore: Send + Sync {
    /// # Errors
    /// Returns [`StoreError`] when the backing storage cannot be read.
    fn load_token(&self) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the backing storage cannot be written.
    fn save_token(&self, token: &str) -> Result<(), StoreError>;

    /// # Errors
    /// Returns [`StoreError`] when the backing storage cannot be written.
    fn clear_token(&self) -> Result<(), StoreError>;
}

/// JSON-file backed store.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Readers only ever see a complete file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load_token(&self) -> Result<Option<String>, StoreError> {
        let entries = self.read_entries()?;
        Ok(entries.get(TOKEN_KEY).filter(|t| !t.is_empty()).cloned())
    }

    fn save_token(&self, token: &str) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        entries.insert(TOKEN_KEY.to_owned(), token.to_owned());
        self.write_entries(&entries)
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        if entries.remove(TOKEN_KEY).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_owned())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_token(&self, token: &str) -> Result<(), StoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_owned());
        Ok(())
    }

    fn clear_token(&self) -> Result<(), StoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
