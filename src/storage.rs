//! Client-side key/value storage.
//!
//! The handshake needs two scopes: durable storage that survives reloads and
//! restarts (the browser's `localStorage`), and tab-scoped storage that lives
//! as long as the tab (`sessionStorage`). Both are modelled by [`Storage`];
//! the host decides which concrete store backs which scope.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Storage key names. Shared with deployed web clients, so they must not change.
pub mod keys {
    /// Durable: JSON-serialized [`Session`](crate::Session).
    pub const SESSION: &str = "farewell-session";
    /// Durable: pending login `state` token.
    pub const KAKAO_STATE: &str = "kakao-state";
    /// Durable: presence means the intro flow was already shown.
    pub const LANDING_SEEN: &str = "farewell-landing-seen";
    /// Durable: JSON-serialized [`OnboardingDraft`](crate::OnboardingDraft).
    pub const ONBOARDING_DRAFT: &str = "onboarding-draft";
    /// Tab-scoped: callback processing in progress.
    pub const CALLBACK_PROCESSED: &str = "kakao-callback-processed";
    /// Tab-scoped: JSON-serialized [`PendingDeepLink`](crate::PendingDeepLink).
    pub const PENDING_DEEP_LINK: &str = "pending-conv-join";
}

/// String key/value store.
///
/// Writes are synchronous: when `set` returns `Ok`, the value is stored.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the value could not be stored.
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the removal could not be persisted.
    fn remove(&self, key: &str) -> Result<(), Error>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Read and decode a JSON value. Absent or malformed values read as `None`.
pub fn get_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Ignoring malformed stored value");
            None
        }
    }
}

/// Encode a value as JSON and store it.
///
/// # Errors
///
/// Returns [`Error::Serialization`] or [`Error::Storage`].
pub fn set_json<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> Result<(), Error> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

/// Remove a key, logging instead of failing. Used on cleanup paths.
pub(crate) fn remove_quietly(storage: &dyn Storage, key: &str) {
    if let Err(e) = storage.remove(key) {
        tracing::warn!(key, error = %e, "Storage removal failed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store. Backs tab-scoped state, and durable state in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        lock(&self.entries).insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Durable store backed by a single JSON object file.
///
/// Every write rewrites the file through a temporary sibling and a rename, so
/// a crash leaves either the old or the new contents. A missing or corrupt
/// file opens as empty.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStorage {
    /// Open (or lazily create) the store at `path`.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt storage file, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable storage file, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        let raw = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = lock(&self.entries);
        let previous = entries.insert(key.to_owned(), value.to_owned());
        if let Err(e) = self.flush(&entries) {
            // Keep memory in line with what is on disk.
            match previous {
                Some(old) => entries.insert(key.to_owned(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&entries)
    }
}
