use crate::jobs::types::job::{CompletionData, Job, JobFields};
use crate::jobs::util::handler::{HandlerError, JobDataHandler};
use crate::jobs::util::id::generate_job_id;
use crate::jobs::util::patch::apply_patch;
use crate::shared::types::app::{ApiResponse, job_not_found, store_failure};
use crate::sync::remote::SyncStatus;

use actix_web::{
    get, post, put, delete, HttpResponse, web::{self, Data},
    Result
};
use chrono::{DateTime, Utc};
use log::info;
use serde::Deserialize;
use serde_json::Value;


// Create a job. Sync clients send the whole record and keep their id when it is free.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobForm {
    id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    fields: JobFields,
    accepted_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    completion_data: Option<CompletionData>
}

#[post("/v1/jobs")]
async fn create_job(handler: Data<dyn JobDataHandler>, params: web::Json<CreateJobForm>) -> Result<HttpResponse> {
    let form = params.into_inner();

    let proposed = match form.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => match handler.get_job(&id).await {
            Ok(None) => Some(id),
            Ok(Some(_)) => None,
            Err(err) => store_failure!(err)
        },
        None => None
    };
    let mut job = Job::from_fields(
        proposed.unwrap_or_else(generate_job_id),
        form.created_at.unwrap_or_else(Utc::now),
        form.fields
    );
    job.accepted_at = form.accepted_at;
    job.started_at = form.started_at;
    job.completed_at = form.completed_at;
    job.approved_at = form.approved_at;
    job.completion_data = form.completion_data;
    job.normalize_completion();

    let created = match handler.insert_job(job.clone()).await {
        Ok(created) => created,
        // Lost a race for the id, take a fresh one
        Err(HandlerError::Conflict(_)) => {
            job.id = generate_job_id();
            match handler.insert_job(job).await {
                Ok(created) => created,
                Err(err) => store_failure!(err)
            }
        },
        Err(err) => store_failure!(err)
    };
    info!("Created job {}", created.id);

    match handler.version().await {
        Ok(version) => Ok(HttpResponse::Ok().json(ApiResponse::ok(created, version))),
        Err(err) => store_failure!(err)
    }
}

#[get("/v1/jobs")]
async fn get_jobs(handler: Data<dyn JobDataHandler>) -> Result<HttpResponse> {
    let jobs = match handler.get_jobs().await {
        Ok(jobs) => jobs,
        Err(err) => store_failure!(err)
    };
    match handler.version().await {
        Ok(version) => Ok(HttpResponse::Ok().json(ApiResponse::ok(jobs, version))),
        Err(err) => store_failure!(err)
    }
}

// Partial update, top level keys of the body replace the stored ones
#[put("/v1/jobs/{id}")]
async fn update_job(handler: Data<dyn JobDataHandler>, path: web::Path<String>, patch: web::Json<Value>) -> Result<HttpResponse> {
    let job_id = path.into_inner();
    let version = match handler.version().await {
        Ok(version) => version,
        Err(err) => store_failure!(err)
    };
    let existing = match handler.get_job(&job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => job_not_found!(version),
        Err(err) => store_failure!(err)
    };

    let mut job = match apply_patch(&existing, patch.into_inner()) {
        Ok(job) => job,
        Err(err) => {
            return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::failed(&format!("Invalid job fields: {err}"), Some(version))));
        }
    };
    job.normalize_completion();

    let updated = match handler.replace_job(job).await {
        Ok(job) => job,
        Err(HandlerError::NotFound(_)) => job_not_found!(version),
        Err(err) => store_failure!(err)
    };
    match handler.version().await {
        Ok(version) => Ok(HttpResponse::Ok().json(ApiResponse::ok(updated, version))),
        Err(err) => store_failure!(err)
    }
}

// Deleting an unknown id is not an error, `data` is false
#[delete("/v1/jobs/{id}")]
async fn delete_job(handler: Data<dyn JobDataHandler>, path: web::Path<String>) -> Result<HttpResponse> {
    let deleted = match handler.delete_job(&path.into_inner()).await {
        Ok(deleted) => deleted,
        Err(err) => store_failure!(err)
    };
    match handler.version().await {
        Ok(version) => Ok(HttpResponse::Ok().json(ApiResponse::ok(deleted, version))),
        Err(err) => store_failure!(err)
    }
}

#[get("/v1/sync/status")]
async fn sync_status(handler: Data<dyn JobDataHandler>) -> Result<HttpResponse> {
    match handler.version().await {
        Ok(version) => Ok(HttpResponse::Ok().json(ApiResponse::ok(SyncStatus { version }, version))),
        Err(err) => store_failure!(err)
    }
}

pub fn routes(app: &mut web::ServiceConfig) {
    app
        .service(get_jobs)
        .service(create_job)
        .service(update_job)
        .service(delete_job)
        .service(sync_status);
}
