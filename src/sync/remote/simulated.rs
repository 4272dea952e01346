//! Stand-in for the central database during local development: the whole dataset lives
//! under one key of a shared `LocalStorage`. Give two profiles the same shared storage to
//! simulate two devices talking to one backend.

use crate::jobs::types::job::Job;
use crate::jobs::util::id::generate_job_id;
use crate::jobs::util::patch::apply_patch;
use crate::sync::error::SyncError;
use crate::sync::remote::{RemoteStore, SyncStatus, Versioned};
use crate::sync::storage::LocalStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::time::Duration;

pub const SHARED_DATABASE_KEY: &str = "locksmith_shared_jobs_db";
const ORIGIN: &str = "simulated-remote";

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SharedDatabase {
    jobs: Vec<Job>,
    version: u64,
    last_modified: Option<DateTime<Utc>>
}

pub struct SimulatedRemote {
    storage: LocalStorage,
    latency: Duration
}

impl SimulatedRemote {
    pub fn new(storage: LocalStorage, latency: Duration) -> SimulatedRemote {
        SimulatedRemote { storage, latency }
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn load(&self) -> SharedDatabase {
        match self.storage.get_item(SHARED_DATABASE_KEY) {
            None => SharedDatabase::default(),
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                error!("Shared job database is corrupt, starting empty: {err}");
                SharedDatabase::default()
            })
        }
    }

    fn save(&self, mut db: SharedDatabase) -> Result<u64, SyncError> {
        db.version += 1;
        db.last_modified = Some(Utc::now());
        let raw = serde_json::to_string(&db)?;
        self.storage.set_item(ORIGIN, SHARED_DATABASE_KEY, &raw)?;
        Ok(db.version)
    }

    fn not_found(job_id: &str) -> SyncError {
        SyncError::Rejected { status: 404, message: format!("Job {job_id} does not exist") }
    }
}

#[async_trait]
impl RemoteStore for SimulatedRemote {
    async fn get_jobs(&self) -> Result<Versioned<Vec<Job>>, SyncError> {
        self.round_trip().await;
        let db = self.load();
        Ok(Versioned { data: db.jobs, version: db.version })
    }

    async fn create_job(&self, job: &Job) -> Result<Versioned<Job>, SyncError> {
        self.round_trip().await;
        let mut db = self.load();
        let mut created = job.clone();
        while created.id.is_empty() || db.jobs.iter().any(|j| j.id == created.id) {
            created.id = generate_job_id();
        }
        db.jobs.push(created.clone());
        let version = self.save(db)?;
        Ok(Versioned { data: created, version })
    }

    async fn update_job(&self, job_id: &str, patch: &Value) -> Result<Versioned<Job>, SyncError> {
        self.round_trip().await;
        let mut db = self.load();
        let slot = db.jobs.iter_mut().find(|j| j.id == job_id)
            .ok_or_else(|| SimulatedRemote::not_found(job_id))?;
        let mut updated = apply_patch(slot, patch.clone())
            .map_err(|err| SyncError::Rejected { status: 400, message: err.to_string() })?;
        updated.normalize_completion();
        *slot = updated.clone();
        let version = self.save(db)?;
        Ok(Versioned { data: updated, version })
    }

    async fn delete_job(&self, job_id: &str) -> Result<Versioned<bool>, SyncError> {
        self.round_trip().await;
        let mut db = self.load();
        let before = db.jobs.len();
        db.jobs.retain(|j| j.id != job_id);
        if db.jobs.len() == before {
            return Ok(Versioned { data: false, version: db.version });
        }
        let version = self.save(db)?;
        Ok(Versioned { data: true, version })
    }

    async fn sync_status(&self) -> Result<SyncStatus, SyncError> {
        Ok(SyncStatus { version: self.load().version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::job::{JobFields, JobStatus};
    use serde_json::json;

    fn job(id: &str) -> Job {
        Job::from_fields(id.to_string(), Utc::now(), JobFields {
            client_name: "Durand".to_string(),
            worker_id: "w1".to_string(),
            worker_name: "Karim".to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn every_mutation_bumps_the_version() {
        let remote = SimulatedRemote::new(LocalStorage::in_memory(), Duration::ZERO);
        assert_eq!(remote.sync_status().await.unwrap().version, 0, "Empty database at version 0");

        let created = remote.create_job(&job("1001")).await.unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.data.id, "1001", "Proposed id kept");

        let updated = remote.update_job("1001", &json!({ "status": "accepted" })).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.data.status, JobStatus::Accepted);

        assert!(remote.delete_job("1001").await.unwrap().data, "Existing job deleted");
        let missing = remote.delete_job("1001").await.unwrap();
        assert!(!missing.data, "Second delete finds nothing");
        assert_eq!(missing.version, 3, "No-op delete leaves the version alone");
    }

    #[tokio::test]
    async fn unfinished_jobs_lose_completion_data() {
        let remote = SimulatedRemote::new(LocalStorage::in_memory(), Duration::ZERO);
        remote.create_job(&job("1001")).await.unwrap();
        let done = remote.update_job("1001", &json!({
            "status": "completed",
            "completionData": { "paymentMethod": "cash", "totalAmount": 150.0, "workerCommission": 45.0 }
        })).await.unwrap();
        assert!(done.data.completion_data.is_some(), "Kept while completed");

        let cancelled = remote.update_job("1001", &json!({ "status": "cancelled" })).await.unwrap();
        assert_eq!(cancelled.data.completion_data, None, "Dropped once cancelled");
        let stored = remote.get_jobs().await.unwrap().data;
        assert_eq!(stored[0].completion_data, None, "Stored without completion data");
    }

    #[tokio::test]
    async fn duplicate_ids_are_replaced_and_unknown_updates_rejected() {
        let remote = SimulatedRemote::new(LocalStorage::in_memory(), Duration::ZERO);
        remote.create_job(&job("1001")).await.unwrap();
        let second = remote.create_job(&job("1001")).await.unwrap();
        assert_ne!(second.data.id, "1001", "Taken id replaced");

        let err = remote.update_job("nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, SyncError::Rejected { status: 404, .. }), "Unknown job is a 404");
    }
}
