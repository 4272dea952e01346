//! Notifications derived from job mutations

use crate::jobs::types::job::{Job, JobStatus, PaymentMethod, Priority};
use crate::jobs::types::notification::{Notification, NotificationType, ADMIN_RECIPIENT};
use crate::jobs::types::update::Actor;

use chrono::{DateTime, Duration, Utc};

/// Sent to the worker a job was (re)assigned to
pub fn job_assigned(job: &Job) -> Notification {
    Notification::new(
        NotificationType::JobAssigned,
        &job.worker_id,
        "New job assigned".to_string(),
        format!("{} for {} at {}", job.service_type, job.client_name, job.address),
        Some(job)
    ).urgent(job.priority == Priority::Urgent)
}

/// Notifications for a status move from `old` to `job.status`
pub fn status_changed(old: JobStatus, job: &Job, actor: &Actor) -> Vec<Notification> {
    let mut out = Vec::new();
    match (old, job.status) {
        (JobStatus::Assigned, JobStatus::Accepted) => out.push(Notification::new(
            NotificationType::JobAccepted,
            ADMIN_RECIPIENT,
            "Job accepted".to_string(),
            format!("{} accepted the job for {}", actor.name, job.client_name),
            Some(job)
        )),
        (JobStatus::Assigned, JobStatus::Cancelled) => out.push(Notification::new(
            NotificationType::JobRejected,
            ADMIN_RECIPIENT,
            "Job rejected".to_string(),
            format!("{} declined the job for {}", actor.name, job.client_name),
            Some(job)
        ).urgent(true)),
        (JobStatus::PendingApproval, JobStatus::Completed) => out.push(Notification::new(
            NotificationType::JobCompleted,
            &job.worker_id,
            "Transfer approved".to_string(),
            format!("The bank transfer for {} was approved", job.client_name),
            Some(job)
        )),
        (from, to) if to.is_finished() && !from.is_finished() => out.push(job_completed(job)),
        _ => ()
    }
    out
}

fn job_completed(job: &Job) -> Notification {
    let data = job.completion_data.clone().unwrap_or_default();
    let (title, message) = if job.status == JobStatus::PendingApproval {
        ("Transfer awaiting approval", format!(
            "{} finished the job for {}, {:.2} by bank transfer to approve",
            job.worker_name, job.client_name, data.total_amount
        ))
    } else if data.travel_fee_only {
        ("Job completed", format!("{} charged the travel fee only for {}", job.worker_name, job.client_name))
    } else {
        ("Job completed", format!(
            "{} completed the job for {}, {:.2} collected by {}",
            job.worker_name, job.client_name, data.total_amount, payment_label(data.payment_method)
        ))
    };
    Notification::new(NotificationType::JobCompleted, ADMIN_RECIPIENT, title.to_string(), message, Some(job))
        .urgent(job.status == JobStatus::PendingApproval)
}

fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "cash",
        PaymentMethod::Card => "card",
        PaymentMethod::Check => "check",
        PaymentMethod::BankTransfer => "bank transfer"
    }
}

/// Reminder sent to the assigned worker. Urgent when the appointment is within the hour.
pub fn appointment_reminder(job: &Job, now: DateTime<Utc>) -> Notification {
    let message = match job.scheduled_date {
        Some(at) => format!("Appointment with {} at {} ({})", job.client_name, at.format("%d/%m %H:%M"), job.address),
        None => format!("Appointment with {} at {}", job.client_name, job.address)
    };
    let soon = job.scheduled_date.map_or(false, |at| at > now && at - now <= Duration::hours(1));
    Notification::new(NotificationType::AppointmentReminder, &job.worker_id, "Appointment reminder".to_string(), message, Some(job))
        .urgent(soon || job.priority == Priority::Urgent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::job::{CompletionData, JobFields};

    fn job(status: JobStatus) -> Job {
        let mut job = Job::from_fields("1001".to_string(), Utc::now(), JobFields {
            client_name: "Durand".to_string(),
            worker_id: "w1".to_string(),
            worker_name: "Karim".to_string(),
            status: Some(status),
            ..Default::default()
        });
        job.normalize_completion();
        job
    }

    #[test]
    fn transitions_to_notifications() {
        let actor = Actor::new("w1", "Karim");
        let accepted = status_changed(JobStatus::Assigned, &job(JobStatus::Accepted), &actor);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].kind, NotificationType::JobAccepted);
        assert_eq!(accepted[0].recipient_id, ADMIN_RECIPIENT, "Acceptance goes to the office");

        let rejected = status_changed(JobStatus::Assigned, &job(JobStatus::Cancelled), &actor);
        assert_eq!(rejected[0].kind, NotificationType::JobRejected);

        assert!(status_changed(JobStatus::Accepted, &job(JobStatus::InProgress), &actor).is_empty(), "Starting is silent");

        let approved = status_changed(JobStatus::PendingApproval, &job(JobStatus::Completed), &Actor::new("admin", "Office"));
        assert_eq!(approved[0].recipient_id, "w1", "Approval goes back to the worker");
    }

    #[test]
    fn pending_transfer_is_urgent() {
        let mut pending = job(JobStatus::PendingApproval);
        pending.completion_data = Some(CompletionData {
            payment_method: PaymentMethod::BankTransfer,
            total_amount: 80.0,
            ..Default::default()
        });
        let out = status_changed(JobStatus::InProgress, &pending, &Actor::new("w1", "Karim"));
        assert_eq!(out[0].kind, NotificationType::JobCompleted);
        assert!(out[0].urgent, "Transfer approval flagged");
        assert!(out[0].message.contains("80.00"), "Amount in message");
    }

    #[test]
    fn reminder_urgency() {
        let now = Utc::now();
        let mut soon = job(JobStatus::Accepted);
        soon.scheduled_date = Some(now + Duration::minutes(30));
        assert!(appointment_reminder(&soon, now).urgent, "Within the hour");

        let mut later = job(JobStatus::Accepted);
        later.scheduled_date = Some(now + Duration::hours(5));
        assert!(!appointment_reminder(&later, now).urgent, "Later today");
    }
}
