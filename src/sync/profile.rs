use crate::sync::message::SyncMessage;
use crate::sync::storage::LocalStorage;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 256;

/// What every tab of one browser profile shares: the durable store and the named
/// pub/sub topics. Tabs are `JobService`s built from clones of the same profile.
#[derive(Clone)]
pub struct Profile {
    storage: LocalStorage,
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<SyncMessage>>>>
}

impl Profile {
    pub fn new(storage: LocalStorage) -> Profile {
        Profile { storage, topics: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn in_memory() -> Profile {
        Profile::new(LocalStorage::in_memory())
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Opens the named topic, creating it on first use
    pub fn topic(&self, name: &str) -> broadcast::Sender<SyncMessage> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}
