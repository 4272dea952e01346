use crate::jobs::types::job::{CompletionData, JobStatus};
use crate::jobs::types::notification::ADMIN_RECIPIENT;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Whoever performed a mutation (a worker or an admin)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub id: String,
    pub name: String
}

impl Actor {
    pub fn new(id: &str, name: &str) -> Actor {
        Actor { id: id.to_string(), name: name.to_string() }
    }

    /// The office, for mutations made from the admin dashboard
    pub fn admin() -> Actor {
        Actor::new(ADMIN_RECIPIENT, "Admin")
    }
}

/// What a single mutation did to a job
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobChange {
    Created,
    StatusChanged { from: JobStatus },
    Completed { from: JobStatus, completion: CompletionData },
    Edited,
    Reassigned { from_worker_id: String, from_worker_name: String },
    Deleted
}

/// Ephemeral description of one mutation, handed to listeners and carried in broadcasts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub change: JobChange
}

impl JobUpdate {
    pub fn new(job_id: &str, status: JobStatus, actor: &Actor, change: JobChange) -> JobUpdate {
        JobUpdate {
            job_id: job_id.to_string(),
            status,
            timestamp: Utc::now(),
            actor: actor.clone(),
            change
        }
    }

    /// Status before the mutation, when the mutation moved the status
    pub fn previous_status(&self) -> Option<JobStatus> {
        match &self.change {
            JobChange::StatusChanged { from } => Some(*from),
            JobChange::Completed { from, .. } => Some(*from),
            _ => None
        }
    }

    /// The mutation finished the work on the job: a worker completion, or the approval
    /// that turns a pending bank transfer into a completed job
    pub fn completes_job(&self) -> bool {
        match &self.change {
            JobChange::Completed { .. } => true,
            JobChange::StatusChanged { from } => *from == JobStatus::PendingApproval && self.status == JobStatus::Completed,
            _ => false
        }
    }
}
