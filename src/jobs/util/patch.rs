use crate::jobs::types::job::{CompletionData, Job, JobStatus, Priority};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Every field of a job, unset ones as `null`, so a patch built from it clears them remotely
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FullRecord<'a> {
    client_name: &'a str,
    client_phone: &'a str,
    client_email: &'a Option<String>,
    address: &'a str,
    service_type: &'a str,
    description: &'a str,
    worker_id: &'a str,
    worker_name: &'a str,
    status: JobStatus,
    priority: Priority,
    scheduled_date: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    completion_data: &'a Option<CompletionData>
}

/// Patch that overwrites every field of the stored record, for whole-record pushes
pub fn full_record(job: &Job) -> Result<Value, serde_json::Error> {
    serde_json::to_value(FullRecord {
        client_name: &job.client_name,
        client_phone: &job.client_phone,
        client_email: &job.client_email,
        address: &job.address,
        service_type: &job.service_type,
        description: &job.description,
        worker_id: &job.worker_id,
        worker_name: &job.worker_name,
        status: job.status,
        priority: job.priority,
        scheduled_date: job.scheduled_date,
        accepted_at: job.accepted_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
        approved_at: job.approved_at,
        completion_data: &job.completion_data
    })
}

/// Apply a partial JSON record to a job. Top level keys present in the patch replace the
/// stored ones wholesale (so arrays such as photo lists are overwritten, never concatenated).
/// `id` and `createdAt` can never be changed this way.
pub fn apply_patch(job: &Job, patch: Value) -> Result<Job, serde_json::Error> {
    let mut current = serde_json::to_value(job)?;

    if let (Value::Object(current), Value::Object(patch)) = (&mut current, patch) {
        for (key, value) in patch {
            if key == "id" || key == "createdAt" { continue; }
            current.insert(key, value);
        }
    }

    let mut updated: Job = serde_json::from_value(current)?;
    updated.id = job.id.clone();
    updated.created_at = job.created_at;
    Ok(updated)
}
