use crate::jobs::types::job::{Job, JobStatus};
use crate::jobs::types::notification::Notification;
use crate::jobs::types::update::JobUpdate;

/// Observer registered on a `JobService`, typically one per view. Every callback has an
/// empty default so a view only implements what it renders.
pub trait JobListener: Send + Sync {
    fn on_job_update(&self, _job: &Job, _update: &JobUpdate) {}
    fn on_job_complete(&self, _job: &Job) {}
    fn on_job_status_change(&self, _job_id: &str, _old: JobStatus, _new: JobStatus) {}
    fn on_notification(&self, _notification: &Notification) {}
    /// The store was reloaded wholesale (another tab, the poller or the remote changed it)
    fn on_jobs_reloaded(&self) {}
}
