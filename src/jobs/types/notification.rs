use crate::jobs::types::job::Job;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Recipient id used for notifications addressed to the office
pub const ADMIN_RECIPIENT: &str = "admin";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    JobAssigned,
    JobAccepted,
    JobRejected,
    JobCompleted,
    AppointmentReminder
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub recipient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub urgent: bool
}

impl Notification {
    pub fn new(kind: NotificationType, recipient_id: &str, title: String, message: String, job: Option<&Job>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            kind,
            title,
            message,
            recipient_id: recipient_id.to_string(),
            job_id: job.map(|j| j.id.clone()),
            worker_id: job.map(|j| j.worker_id.clone()),
            timestamp: Utc::now(),
            read: false,
            urgent: false
        }
    }

    pub fn urgent(mut self, urgent: bool) -> Notification {
        self.urgent = urgent;
        self
    }
}
