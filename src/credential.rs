//! Credential store collaborator.
//!
//! The session only borrows the bearer token: it is read once per
//! connection-open to build the `user_auth` frame. Writing and clearing the
//! token (login, logout, forced logout after `auth_failure`) belong to the
//! application, which shares the same store with its HTTP client.
//!
//! # Implementations
//!
//! | Type | Backing |
//! |------|---------|
//! | [`MemoryCredentialStore`] | Process memory |
//! | [`FileCredentialStore`] | JSON object in a file |

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Key the bearer token is stored under.
pub const DEFAULT_CREDENTIAL_KEY: &str = "user-token";

// ============================================================================
// CredentialStore
// ============================================================================

/// Durable key-value store holding the bearer credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Reads the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<FxHashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `token` under [`DEFAULT_CREDENTIAL_KEY`].
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .insert(DEFAULT_CREDENTIAL_KEY.to_string(), token.into());
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// Credential store persisted as a flat JSON object.
///
/// A missing file reads as an empty store. Writes replace the whole file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: AsyncMutex<()>,
}

impl FileCredentialStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::credential_store(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, map: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(&Value::Object(map))?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "Credential store saved");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.load().await?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.save(map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(map).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
