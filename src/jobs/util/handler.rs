//! An abstraction layer interface for the job store behind the HTTP API

use crate::jobs::types::job::{Job, JobId};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Job `{0}` does not exist")]
    NotFound(String),
    #[error("Job `{0}` already exists")]
    Conflict(String),
    #[error("Invalid job record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error)
}

/// Every mutation bumps a store-wide version counter, clients poll it to detect changes
#[async_trait]
pub trait JobDataHandler: Send + Sync {
    // Called on first launch for setup
    async fn init(&self) -> Result<(), HandlerError>;

    async fn get_jobs(&self) -> Result<Vec<Job>, HandlerError>;
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, HandlerError>;

    /// Fails with `Conflict` if the id is taken
    async fn insert_job(&self, job: Job) -> Result<Job, HandlerError>;
    /// Whole-record overwrite, fails with `NotFound` if the id is unknown
    async fn replace_job(&self, job: Job) -> Result<Job, HandlerError>;
    /// Returns false if there was nothing to delete
    async fn delete_job(&self, job_id: &JobId) -> Result<bool, HandlerError>;

    async fn version(&self) -> Result<u64, HandlerError>;
}
