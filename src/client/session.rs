//! Session-scoped key/value storage for client credential state.
//!
//! The PKCE redirect can outlive the process that started it, so nothing the
//! flow needs after the redirect is kept in local variables. It goes through
//! a [`SessionStore`] instead:
//!
//! - [`MemorySessionStore`] for tests and embedding, where the "session" is
//!   the lifetime of the value;
//! - [`FileSessionStore`] for the CLI, where a JSON file under the user cache
//!   directory carries state from `login` to later commands.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

/// Errors from a [`SessionStore`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backing file could not be read or written.
    #[error("session file {path}: {source}")]
    Io {
        /// Session file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file or a stored value is not valid JSON.
    #[error("session data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// No per-user cache directory could be determined.
    #[error("could not determine a cache directory for the session file")]
    NoCacheDir,
}

/// String key/value storage scoped to one user session.
///
/// Implementations must be safe to share between the flow controller and
/// the API client.
pub trait SessionStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Removes `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), SessionError>;

    /// Removes every key.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Process-local [`SessionStore`].
///
/// # Examples
///
/// ```
/// use pkce_tasks::client::session::{MemorySessionStore, SessionStore};
///
/// let store = MemorySessionStore::new();
/// store.set("k", "v").unwrap();
/// assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
/// store.clear().unwrap();
/// assert!(store.get("k").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.entries.write().clear();
        Ok(())
    }
}

/// [`SessionStore`] persisted as one JSON object in a file.
///
/// Every write rewrites the whole file; the lock serializes writers within
/// one process. Two processes writing the same file concurrently are not
/// supported.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Uses `path` as the session file. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Uses `<cache dir>/pkce-tasks/session.json`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoCacheDir`] on platforms without a cache directory.
    pub fn default_location() -> Result<Self, SessionError> {
        let dir = dirs::cache_dir().ok_or(SessionError::NoCacheDir)?;
        Ok(Self::new(dir.join("pkce-tasks").join("session.json")))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<HashMap<String, String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content).map_err(|e| self.io_error(e))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
