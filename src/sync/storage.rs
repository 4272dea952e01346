//! Durable per-profile key-value store
//!
//! Every tab of a profile holds a clone of the same `LocalStorage`. Writes fire a
//! `StorageEvent` tagged with the writing tab, listeners are expected to skip their own
//! events. The directory backend keeps one file per key so separate processes sharing the
//! directory see each other's writes on their next read (mutation events stay in-process,
//! the poller covers the rest).

use crate::sync::error::StorageError;

use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// Tab that performed the write
    pub origin: String
}

enum Backend {
    Memory(Mutex<HashMap<String, String>>),
    Directory(PathBuf)
}

struct Inner {
    backend: Backend,
    events: broadcast::Sender<StorageEvent>
}

#[derive(Clone)]
pub struct LocalStorage {
    inner: Arc<Inner>
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !key.starts_with('.')
}

impl LocalStorage {
    pub fn in_memory() -> LocalStorage {
        LocalStorage::with_backend(Backend::Memory(Mutex::new(HashMap::new())))
    }

    pub fn open<P: AsRef<Path>>(dir: P) -> Result<LocalStorage, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io { key: dir.display().to_string(), source })?;
        Ok(LocalStorage::with_backend(Backend::Directory(dir)))
    }

    fn with_backend(backend: Backend) -> LocalStorage {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        LocalStorage { inner: Arc::new(Inner { backend, events }) }
    }

    fn memory(map: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
        map.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn path_for(dir: &Path, key: &str) -> Result<PathBuf, StorageError> {
        if !valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(dir.join(format!("{key}.value")))
    }

    /// Missing or unreadable keys read as `None`
    pub fn get_item(&self, key: &str) -> Option<String> {
        match &self.inner.backend {
            Backend::Memory(map) => LocalStorage::memory(map).get(key).cloned(),
            Backend::Directory(dir) => {
                let path = LocalStorage::path_for(dir, key).ok()?;
                match fs::read_to_string(&path) {
                    Ok(value) => Some(value),
                    Err(err) if err.kind() == ErrorKind::NotFound => None,
                    Err(err) => {
                        warn!("Could not read storage key {key}: {err}");
                        None
                    }
                }
            }
        }
    }

    pub fn set_item(&self, origin: &str, key: &str, value: &str) -> Result<(), StorageError> {
        match &self.inner.backend {
            Backend::Memory(map) => {
                if !valid_key(key) {
                    return Err(StorageError::InvalidKey(key.to_string()));
                }
                LocalStorage::memory(map).insert(key.to_string(), value.to_string());
            },
            Backend::Directory(dir) => {
                let path = LocalStorage::path_for(dir, key)?;
                // Write then rename so readers never see half a value
                let tmp = dir.join(format!(".{key}.tmp"));
                fs::write(&tmp, value)
                    .and_then(|_| fs::rename(&tmp, &path))
                    .map_err(|source| StorageError::Io { key: key.to_string(), source })?;
            }
        }
        self.emit(origin, key, Some(value.to_string()));
        Ok(())
    }

    pub fn remove_item(&self, origin: &str, key: &str) -> Result<(), StorageError> {
        let existed = match &self.inner.backend {
            Backend::Memory(map) => LocalStorage::memory(map).remove(key).is_some(),
            Backend::Directory(dir) => {
                let path = LocalStorage::path_for(dir, key)?;
                match fs::remove_file(&path) {
                    Ok(()) => true,
                    Err(err) if err.kind() == ErrorKind::NotFound => false,
                    Err(source) => return Err(StorageError::Io { key: key.to_string(), source })
                }
            }
        };
        if existed {
            self.emit(origin, key, None);
        }
        Ok(())
    }

    /// Mutation events from every tab, including the subscriber's own
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, origin: &str, key: &str, new_value: Option<String>) {
        // No subscribers is fine
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: origin.to_string()
        });
    }
}
