//! Remote sync client
//!
//! Mirrors a profile's jobs to a shared service (simulated in a shared store, or the HTTP
//! server) and polls the service's version counter to discover writes made by other
//! profiles. Writers are not ordered and nothing detects conflicts: the remote keeps the
//! last whole record written for each job id.

pub mod http;
pub mod retry;
pub mod simulated;

use crate::jobs::types::job::Job;
use crate::jobs::util::patch::full_record;
use crate::sync::error::SyncError;
use crate::sync::remote::retry::RetryPolicy;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub version: u64
}

/// A successful remote reply with the version the remote was at when it answered
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_jobs(&self) -> Result<Versioned<Vec<Job>>, SyncError>;
    /// The remote keeps the proposed id and creation time when the id is free
    async fn create_job(&self, job: &Job) -> Result<Versioned<Job>, SyncError>;
    /// Partial record, top level keys replace the stored ones
    async fn update_job(&self, job_id: &str, patch: &Value) -> Result<Versioned<Job>, SyncError>;
    async fn delete_job(&self, job_id: &str) -> Result<Versioned<bool>, SyncError>;
    async fn sync_status(&self) -> Result<SyncStatus, SyncError>;
}

pub type RemoteChangeCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct ClientInner {
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    poll_interval: Duration,
    last_version: AtomicU64,
    listeners: Mutex<HashMap<String, RemoteChangeCallback>>,
    task: Mutex<Option<JoinHandle<()>>>
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<ClientInner>
}

impl SyncClient {
    pub fn new(remote: Arc<dyn RemoteStore>, poll_interval: Duration, retry: RetryPolicy) -> SyncClient {
        SyncClient {
            inner: Arc::new(ClientInner {
                remote,
                retry,
                poll_interval,
                last_version: AtomicU64::new(0),
                listeners: Mutex::new(HashMap::new()),
                task: Mutex::new(None)
            })
        }
    }

    pub fn last_version(&self) -> u64 {
        self.inner.last_version.load(Ordering::SeqCst)
    }

    fn observe_version(&self, version: u64) {
        self.inner.last_version.fetch_max(version, Ordering::SeqCst);
    }

    /// Forget the known version so the next poll reports a change. Used after a failed pull.
    pub fn invalidate(&self) {
        self.inner.last_version.store(0, Ordering::SeqCst);
    }

    pub async fn get_jobs(&self) -> Result<Versioned<Vec<Job>>, SyncError> {
        let jobs = self.inner.remote.get_jobs().await?;
        self.observe_version(jobs.version);
        Ok(jobs)
    }

    pub async fn create_job(&self, job: &Job) -> Result<Versioned<Job>, SyncError> {
        let remote = &self.inner.remote;
        self.inner.retry.run("create job", || remote.create_job(job)).await
    }

    /// Whole-record push, fields unset locally are cleared remotely. A job the remote has
    /// never seen is created instead.
    pub async fn update_job(&self, job: &Job) -> Result<Versioned<Job>, SyncError> {
        let patch = full_record(job)?;
        let remote = &self.inner.remote;
        match self.inner.retry.run("update job", || remote.update_job(&job.id, &patch)).await {
            Err(SyncError::Rejected { status: 404, .. }) => {
                debug!("Job {} unknown remotely, creating it", job.id);
                self.create_job(job).await
            },
            other => other
        }
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<Versioned<bool>, SyncError> {
        let remote = &self.inner.remote;
        self.inner.retry.run("delete job", || remote.delete_job(job_id)).await
    }

    /// Cheap version read. True when the remote moved past the last version seen.
    pub async fn check_for_changes(&self) -> Result<bool, SyncError> {
        let status = self.inner.remote.sync_status().await?;
        let previous = self.inner.last_version.fetch_max(status.version, Ordering::SeqCst);
        Ok(status.version > previous)
    }

    pub fn add_change_listener(&self, id: &str, callback: RemoteChangeCallback) {
        lock(&self.inner.listeners).insert(id.to_string(), callback);
    }

    pub fn remove_change_listener(&self, id: &str) -> bool {
        lock(&self.inner.listeners).remove(id).is_some()
    }

    fn notify(&self, has_changes: bool) {
        let listeners: Vec<RemoteChangeCallback> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in listeners {
            listener(has_changes);
        }
    }

    /// One immediate poll round, for user triggered refreshes
    pub async fn force_sync(&self) -> Result<bool, SyncError> {
        let changed = self.check_for_changes().await?;
        if changed {
            self.notify(true);
        }
        Ok(changed)
    }

    /// Push every local job the remote does not know yet. Returns how many were pushed.
    pub async fn migrate_local_data(&self, jobs: &[Job]) -> Result<usize, SyncError> {
        let remote_ids: HashSet<String> = self.get_jobs().await?.data.into_iter().map(|j| j.id).collect();
        let missing: Vec<&Job> = jobs.iter().filter(|j| !remote_ids.contains(&j.id)).collect();
        let results = join_all(missing.iter().map(|job| self.create_job(job))).await;

        let mut pushed = 0;
        for (job, result) in missing.iter().zip(results) {
            match result {
                Ok(_) => pushed += 1,
                Err(err) => warn!("Could not migrate job {}: {err}", job.id)
            }
        }
        if pushed > 0 {
            info!("Migrated {pushed} local jobs to the remote");
        }
        Ok(pushed)
    }

    /// Needs a tokio runtime, calling it twice is a no-op
    pub fn start_polling(&self) {
        let mut task = lock(&self.inner.task);
        if task.is_some() { return; }

        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let period = self.inner.poll_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let client = match weak.upgrade() {
                    Some(inner) => SyncClient { inner },
                    None => break
                };
                match client.check_for_changes().await {
                    Ok(true) => client.notify(true),
                    Ok(false) => (),
                    // Next tick is the retry
                    Err(err) => debug!("Remote poll failed: {err}")
                }
            }
        }));
    }

    pub fn stop_polling(&self) {
        if let Some(task) = lock(&self.inner.task).take() {
            task.abort();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}
