use crate::jobs::types::job::Job;
use crate::jobs::types::notification::Notification;
use crate::sync::error::StorageError;
use crate::sync::storage::LocalStorage;

use chrono::{DateTime, Utc};
use log::error;
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use uuid::Uuid;

pub const JOBS_KEY: &str = "locksmith_jobs";
pub const NOTIFICATIONS_KEY: &str = "locksmith_notifications";

/// On-disk shape of a keyed collection: `{"entries": [[id, record], ...], "savedAt": ...}`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<T> {
    entries: Vec<(String, T)>,
    saved_at: DateTime<Utc>
}

fn load<T: DeserializeOwned>(storage: &LocalStorage, key: &str) -> Vec<(String, T)> {
    let Some(raw) = storage.get_item(key) else { return Vec::new(); };
    match serde_json::from_str::<Snapshot<T>>(&raw) {
        Ok(snapshot) => snapshot.entries,
        Err(err) => {
            error!("Stored {key} is unreadable, treating it as empty: {err}");
            Vec::new()
        }
    }
}

fn save<T: Serialize>(storage: &LocalStorage, origin: &str, key: &str, entries: Vec<(String, &T)>) -> Result<String, StorageError> {
    let snapshot = Snapshot { entries, saved_at: Utc::now() };
    let raw = serde_json::to_string(&snapshot)
        .map_err(|err| StorageError::Encode { key: key.to_string(), message: err.to_string() })?;
    storage.set_item(origin, key, &raw)?;
    Ok(raw)
}

pub fn load_jobs(storage: &LocalStorage) -> HashMap<String, Job> {
    load::<Job>(storage, JOBS_KEY).into_iter().collect()
}

pub fn load_notifications(storage: &LocalStorage) -> HashMap<Uuid, Notification> {
    load::<Notification>(storage, NOTIFICATIONS_KEY).into_iter()
        .map(|(_, notification)| (notification.id, notification))
        .collect()
}

/// Returns the raw value written so the caller can acknowledge it to the poller
pub fn save_jobs(storage: &LocalStorage, origin: &str, jobs: &HashMap<String, Job>) -> Result<String, StorageError> {
    let mut entries: Vec<(String, &Job)> = jobs.iter().map(|(id, job)| (id.clone(), job)).collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    save(storage, origin, JOBS_KEY, entries)
}

pub fn save_notifications(storage: &LocalStorage, origin: &str, notifications: &HashMap<Uuid, Notification>) -> Result<String, StorageError> {
    let mut entries: Vec<(String, &Notification)> = notifications.values()
        .map(|n| (n.id.to_string(), n))
        .collect();
    entries.sort_by_key(|(_, n)| n.timestamp);
    save(storage, origin, NOTIFICATIONS_KEY, entries)
}
