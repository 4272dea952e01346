// A handler that just stores jobs in memory (non-persistent)
// Used for debugging purposes and tests

use crate::jobs::types::job::{Job, JobId};
use crate::jobs::util::handler::{HandlerError, JobDataHandler};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<String, Job>,
    version: u64
}

#[derive(Default)]
pub struct MemoryHandler {
    state: Mutex<MemoryState>
}

impl MemoryHandler {
    pub fn new() -> MemoryHandler {
        MemoryHandler::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobDataHandler for MemoryHandler {
    async fn init(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn get_jobs(&self) -> Result<Vec<Job>, HandlerError> {
        let mut jobs: Vec<Job> = self.state().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, HandlerError> {
        Ok(self.state().jobs.get(job_id).cloned())
    }

    async fn insert_job(&self, job: Job) -> Result<Job, HandlerError> {
        let mut state = self.state();
        if state.jobs.contains_key(&job.id) {
            return Err(HandlerError::Conflict(job.id));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        state.version += 1;
        Ok(job)
    }

    async fn replace_job(&self, job: Job) -> Result<Job, HandlerError> {
        let mut state = self.state();
        match state.jobs.get_mut(&job.id) {
            None => return Err(HandlerError::NotFound(job.id)),
            Some(existing) => *existing = job.clone()
        }
        state.version += 1;
        Ok(job)
    }

    async fn delete_job(&self, job_id: &JobId) -> Result<bool, HandlerError> {
        let mut state = self.state();
        if state.jobs.remove(job_id).is_none() {
            return Ok(false);
        }
        state.version += 1;
        Ok(true)
    }

    async fn version(&self) -> Result<u64, HandlerError> {
        Ok(self.state().version)
    }
}
