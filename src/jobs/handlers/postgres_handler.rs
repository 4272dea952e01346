use crate::jobs::types::job::{Job, JobId};
use crate::jobs::util::handler::{HandlerError, JobDataHandler};
use crate::shared::util::config;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::types::Json;
use sqlx::postgres::{PgPool, PgRow};

#[derive(Clone)]
pub struct PostgresHandler {
    pool: PgPool
}

impl PostgresHandler {
    pub async fn new() -> Result<PostgresHandler, sqlx::Error> {
        Ok(PostgresHandler { pool: config::get_pool().await? })
    }
}

// Bumps the sync version inside the caller's transaction
macro_rules! bump_version {
    ($tx: ident) => {
        sqlx::query("UPDATE jobs.sync_version SET version = version + 1 WHERE id = 1;")
            .execute(&mut *$tx).await?;
    };
}

#[async_trait]
impl JobDataHandler for PostgresHandler {
    // Called on first launch for setup
    async fn init(&self) -> Result<(), HandlerError> {
        sqlx::query(format!("CREATE SCHEMA IF NOT EXISTS jobs AUTHORIZATION {};", config::get_config().database.user).as_str())
            .execute(&self.pool).await?;

        // Whole job record as json, the sync protocol only ever overwrites full records
        sqlx::query(r#"CREATE TABLE IF NOT EXISTS jobs.records (
            id text primary key unique CHECK(length(id) < 128),
            record jsonb NOT NULL,
            created timestamptz NOT NULL,
            edited timestamptz NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query(r#"CREATE TABLE IF NOT EXISTS jobs.sync_version (
            id integer primary key CHECK(id = 1),
            version bigint NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query("INSERT INTO jobs.sync_version(id, version) VALUES(1, 0) ON CONFLICT DO NOTHING;")
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_jobs(&self) -> Result<Vec<Job>, HandlerError> {
        Ok(sqlx::query("SELECT record FROM jobs.records ORDER BY created DESC;")
            .map(|row: PgRow| row.get::<Json<Job>, &str>("record").0)
            .fetch_all(&self.pool).await?)
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, HandlerError> {
        Ok(sqlx::query("SELECT record FROM jobs.records WHERE id = $1;")
            .bind(job_id)
            .map(|row: PgRow| row.get::<Json<Job>, &str>("record").0)
            .fetch_optional(&self.pool).await?)
    }

    async fn insert_job(&self, job: Job) -> Result<Job, HandlerError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(r#"INSERT INTO jobs.records(id, record, created, edited)
            VALUES($1, $2, $3, $4) ON CONFLICT DO NOTHING;"#)
            .bind(&job.id).bind(Json(&job)).bind(job.created_at).bind(Utc::now())
            .execute(&mut *tx).await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(HandlerError::Conflict(job.id));
        }
        bump_version!(tx);
        tx.commit().await?;
        Ok(job)
    }

    async fn replace_job(&self, job: Job) -> Result<Job, HandlerError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE jobs.records SET record = $2, edited = $3 WHERE id = $1;")
            .bind(&job.id).bind(Json(&job)).bind(Utc::now())
            .execute(&mut *tx).await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(HandlerError::NotFound(job.id));
        }
        bump_version!(tx);
        tx.commit().await?;
        Ok(job)
    }

    async fn delete_job(&self, job_id: &JobId) -> Result<bool, HandlerError> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM jobs.records WHERE id = $1;")
            .bind(job_id).execute(&mut *tx).await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        bump_version!(tx);
        tx.commit().await?;
        Ok(true)
    }

    async fn version(&self) -> Result<u64, HandlerError> {
        let version = sqlx::query("SELECT version FROM jobs.sync_version WHERE id = 1;")
            .fetch_optional(&self.pool).await?
            .map(|row| row.get::<i64, &str>("version"))
            .unwrap_or(0);
        Ok(version.max(0) as u64)
    }
}
