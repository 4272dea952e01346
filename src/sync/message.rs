use crate::jobs::types::job::Job;
use crate::jobs::types::notification::Notification;
use crate::jobs::types::update::JobUpdate;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Payload of a cross-tab broadcast, serialized as `{"type": ..., "data": ...}`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    JobCreated { job: Job, update: JobUpdate },
    JobUpdated { job: Job, update: JobUpdate },
    JobDeleted { job: Job, update: JobUpdate },
    NotificationCreated { notification: Notification },
    /// Not a diff, receivers re-read everything from the durable store
    ForceRefresh { reason: String }
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::JobCreated { .. } => "JOB_CREATED",
            SyncEvent::JobUpdated { .. } => "JOB_UPDATED",
            SyncEvent::JobDeleted { .. } => "JOB_DELETED",
            SyncEvent::NotificationCreated { .. } => "NOTIFICATION_CREATED",
            SyncEvent::ForceRefresh { .. } => "FORCE_REFRESH"
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncMessage {
    /// Unique per broadcast, lets a tab drop the copy arriving on the second channel
    pub id: Uuid,
    #[serde(flatten)]
    pub event: SyncEvent,
    pub timestamp: DateTime<Utc>,
    /// Tab that sent the message
    pub source: String
}

impl SyncMessage {
    pub fn new(source: &str, event: SyncEvent) -> SyncMessage {
        SyncMessage { id: Uuid::new_v4(), event, timestamp: Utc::now(), source: source.to_string() }
    }
}
