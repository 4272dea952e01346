#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use locksmith_job_sync::jobs::types::job::{CompletionPatch, Job, JobFields, JobStatus, PaymentMethod};
    use locksmith_job_sync::jobs::types::notification::Notification;
    use locksmith_job_sync::jobs::types::update::{Actor, JobUpdate};
    use locksmith_job_sync::shared::util::config::{RemoteMode, SyncConfig};
    use locksmith_job_sync::sync::error::SyncError;
    use locksmith_job_sync::sync::listener::JobListener;
    use locksmith_job_sync::sync::profile::Profile;
    use locksmith_job_sync::sync::remote::retry::RetryPolicy;
    use locksmith_job_sync::sync::remote::simulated::SimulatedRemote;
    use locksmith_job_sync::sync::remote::{RemoteStore, SyncClient, SyncStatus, Versioned};
    use locksmith_job_sync::sync::service::JobService;
    use locksmith_job_sync::sync::storage::LocalStorage;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    fn config() -> SyncConfig {
        SyncConfig { remote: RemoteMode::None, ..Default::default() }
    }

    fn fields(client_name: &str) -> JobFields {
        JobFields {
            client_name: client_name.to_string(),
            client_phone: "0600000000".to_string(),
            address: "12 rue des Lilas".to_string(),
            service_type: "Door opening".to_string(),
            worker_id: "w1".to_string(),
            worker_name: "Karim".to_string(),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<String>>,
        status_changes: Mutex<Vec<(String, JobStatus, JobStatus)>>,
        completed: AtomicUsize,
        notifications: AtomicUsize,
        reloads: AtomicUsize
    }

    impl Recorder {
        fn updates(&self) -> Vec<String> {
            self.updates.lock().unwrap().clone()
        }
    }

    impl JobListener for Recorder {
        fn on_job_update(&self, job: &Job, _update: &JobUpdate) {
            self.updates.lock().unwrap().push(job.id.clone());
        }

        fn on_job_complete(&self, _job: &Job) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_status_change(&self, job_id: &str, old: JobStatus, new: JobStatus) {
            self.status_changes.lock().unwrap().push((job_id.to_string(), old, new));
        }

        fn on_notification(&self, _notification: &Notification) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
        }

        fn on_jobs_reloaded(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn listen(service: &JobService) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        service.add_listener("test", recorder.clone());
        recorder
    }

    fn simulated_client(shared: &LocalStorage) -> SyncClient {
        let remote = Arc::new(SimulatedRemote::new(shared.clone(), Duration::ZERO));
        SyncClient::new(remote, Duration::from_secs(2), RetryPolicy::exponential(3, Duration::from_millis(250)))
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_reaches_every_other_tab_once() {
        let profile = Profile::in_memory();
        let sender = JobService::new(&profile, config(), None);
        let first = JobService::new(&profile, config(), None);
        let second = JobService::new(&profile, config(), None);
        for tab in [&sender, &first, &second] {
            tab.start();
        }
        let own = listen(&sender);
        let heard_first = listen(&first);
        let heard_second = listen(&second);

        let job = sender.add_job(fields("Durand"));
        sleep(Duration::from_millis(50)).await;

        assert_eq!(heard_first.updates(), vec![job.id.clone()], "Delivered once despite two channels");
        assert_eq!(heard_second.updates(), vec![job.id.clone()], "Every other tab hears it");
        assert_eq!(own.updates(), vec![job.id.clone()], "Sender only sees its local callback");
        assert_eq!(heard_first.notifications.load(Ordering::SeqCst), 1, "Assignment notification relayed");
        assert!(first.get_job(&job.id).is_some(), "Receiver reloaded its store");
    }

    #[tokio::test(start_paused = true)]
    async fn status_callbacks_cross_tabs() {
        let profile = Profile::in_memory();
        let worker_tab = JobService::new(&profile, config(), None);
        let admin_tab = JobService::new(&profile, config(), None);
        worker_tab.start();
        admin_tab.start();
        let admin = listen(&admin_tab);

        let worker = Actor::new("w1", "Karim");
        let job = worker_tab.add_job(fields("Durand"));
        worker_tab.update_job_status(&job.id, JobStatus::Accepted, &worker, None).unwrap();
        worker_tab.update_job_status(&job.id, JobStatus::InProgress, &worker, None).unwrap();
        worker_tab.update_job_status(&job.id, JobStatus::Completed, &worker, Some(CompletionPatch {
            payment_method: Some(PaymentMethod::Card),
            total_amount: Some(150.0),
            worker_commission: Some(45.0),
            ..Default::default()
        })).unwrap();
        sleep(Duration::from_millis(500)).await;

        let changes = admin.status_changes.lock().unwrap().clone();
        assert_eq!(changes, vec![
            (job.id.clone(), JobStatus::Assigned, JobStatus::Accepted),
            (job.id.clone(), JobStatus::Accepted, JobStatus::InProgress),
            (job.id.clone(), JobStatus::InProgress, JobStatus::Completed),
        ], "Transitions replayed in order");
        assert_eq!(admin.completed.load(Ordering::SeqCst), 1, "Completion relayed");
        assert!(admin.reloads.load(Ordering::SeqCst) >= 1, "Second wave forced a refresh");
        assert_eq!(admin_tab.get_job(&job.id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_catches_missed_broadcasts() {
        let profile = Profile::in_memory();
        let quiet = SyncConfig { storage_fallback: false, ..config() };
        let writer = JobService::new(&profile, quiet.clone(), None);
        // Different topic and no fallback: only the poller can tell this tab
        let deaf = JobService::new(&profile, SyncConfig { broadcast_topic: "elsewhere".to_string(), ..quiet }, None);
        writer.start();
        deaf.start();
        let heard = listen(&deaf);

        let job = writer.add_job(fields("Durand"));
        sleep(Duration::from_millis(50)).await;
        assert!(heard.updates().is_empty(), "No broadcast reached the tab");

        sleep(Duration::from_millis(1000)).await;
        assert!(deaf.get_job(&job.id).is_some(), "Converged within one poll interval");
        assert!(heard.reloads.load(Ordering::SeqCst) >= 1, "Reload reported");
    }

    #[tokio::test(start_paused = true)]
    async fn deletions_propagate() {
        let profile = Profile::in_memory();
        let admin_tab = JobService::new(&profile, config(), None);
        let worker_tab = JobService::new(&profile, config(), None);
        admin_tab.start();
        worker_tab.start();

        let job = admin_tab.add_job(fields("Durand"));
        sleep(Duration::from_millis(50)).await;
        assert!(worker_tab.get_job(&job.id).is_some());

        let heard = listen(&worker_tab);
        assert!(admin_tab.delete_job(&job.id));
        sleep(Duration::from_millis(50)).await;
        assert!(worker_tab.get_job(&job.id).is_none(), "Gone in the other tab");
        assert_eq!(heard.updates(), vec![job.id.clone()], "Deletion relayed to listeners");
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_tab_stops_listening() {
        let profile = Profile::in_memory();
        let writer = JobService::new(&profile, config(), None);
        let closed = JobService::new(&profile, config(), None);
        writer.start();
        closed.start();
        let heard = listen(&closed);
        closed.destroy();

        writer.add_job(fields("Durand"));
        sleep(Duration::from_secs(3)).await;
        assert!(heard.updates().is_empty(), "Nothing delivered after destroy");
        assert_eq!(heard.reloads.load(Ordering::SeqCst), 0, "Poller stopped too");
    }

    #[tokio::test(start_paused = true)]
    async fn profiles_converge_through_the_remote() {
        let shared = LocalStorage::in_memory();
        let office = JobService::new(&Profile::in_memory(), config(), Some(simulated_client(&shared)));
        let phone = JobService::new(&Profile::in_memory(), config(), Some(simulated_client(&shared)));
        office.start();
        phone.start();
        sleep(Duration::from_millis(50)).await;
        let heard = listen(&phone);

        let job = office.add_job(fields("Durand"));
        assert!(office.wait_for_pushes(Duration::from_secs(5)).await, "Push settled");
        assert!(phone.get_job(&job.id).is_none(), "Other profile has not polled yet");

        sleep(Duration::from_millis(2100)).await;
        assert!(phone.get_job(&job.id).is_some(), "Picked up by the remote poll");
        assert!(heard.reloads.load(Ordering::SeqCst) >= 1, "Reload reported");

        let worker = Actor::new("w1", "Karim");
        phone.update_job_status(&job.id, JobStatus::Accepted, &worker, None).unwrap();
        assert!(phone.wait_for_pushes(Duration::from_secs(5)).await);
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(office.get_job(&job.id).unwrap().status, JobStatus::Accepted, "Round trip back to the office");
    }

    #[tokio::test(start_paused = true)]
    async fn start_migrates_local_jobs() {
        let shared = LocalStorage::in_memory();
        let profile = Profile::in_memory();
        let offline = JobService::new(&profile, config(), None);
        let job = offline.add_job(fields("Durand"));

        let online = JobService::new(&profile, config(), Some(simulated_client(&shared)));
        let remote = simulated_client(&shared);
        online.start();
        sleep(Duration::from_millis(50)).await;

        let remote_jobs = remote.get_jobs().await.unwrap();
        assert_eq!(remote_jobs.data.len(), 1, "Local job pushed at startup");
        assert_eq!(remote_jobs.data[0].id, job.id, "Id kept");
        assert!(online.get_job(&job.id).is_some(), "Still there after the first pull");
    }

    #[tokio::test(start_paused = true)]
    async fn sync_now_pulls_on_change() {
        let shared = LocalStorage::in_memory();
        let office = JobService::new(&Profile::in_memory(), config(), Some(simulated_client(&shared)));
        let phone = JobService::new(&Profile::in_memory(), config(), Some(simulated_client(&shared)));

        let job = office.add_job(fields("Durand"));
        assert!(office.wait_for_pushes(Duration::from_secs(5)).await);

        assert!(phone.sync_now().await.unwrap(), "Remote moved on");
        assert!(phone.get_job(&job.id).is_some(), "Pulled");
        assert!(!phone.sync_now().await.unwrap(), "Nothing new the second time");

        let local_only = JobService::new(&Profile::in_memory(), config(), None);
        assert!(!local_only.sync_now().await.unwrap(), "No remote, nothing to do");
    }

    struct Unreachable {
        calls: AtomicUsize
    }

    #[async_trait]
    impl RemoteStore for Unreachable {
        async fn get_jobs(&self) -> Result<Versioned<Vec<Job>>, SyncError> {
            Err(SyncError::Transport("connection refused".to_string()))
        }

        async fn create_job(&self, _job: &Job) -> Result<Versioned<Job>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Transport("connection refused".to_string()))
        }

        async fn update_job(&self, _job_id: &str, _patch: &Value) -> Result<Versioned<Job>, SyncError> {
            Err(SyncError::Transport("connection refused".to_string()))
        }

        async fn delete_job(&self, _job_id: &str) -> Result<Versioned<bool>, SyncError> {
            Err(SyncError::Transport("connection refused".to_string()))
        }

        async fn sync_status(&self) -> Result<SyncStatus, SyncError> {
            Err(SyncError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_keeps_local_state() {
        let remote = Arc::new(Unreachable { calls: AtomicUsize::new(0) });
        let client = SyncClient::new(remote.clone(), Duration::from_secs(2), RetryPolicy::exponential(3, Duration::from_millis(250)));
        let service = JobService::new(&Profile::in_memory(), config(), Some(client));

        let job = service.add_job(fields("Durand"));
        assert!(service.wait_for_pushes(Duration::from_secs(10)).await, "Push gave up");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3, "Retried up to the limit");
        assert!(service.get_job(&job.id).is_some(), "Job kept locally");
        assert!(service.sync_now().await.is_err(), "Sync reports the outage");
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_fields_stay_cleared() {
        let shared = LocalStorage::in_memory();
        let service = JobService::new(&Profile::in_memory(), config(), Some(simulated_client(&shared)));
        let job = service.add_job(JobFields { client_email: Some("old@example.fr".to_string()), ..fields("Durand") });
        assert!(service.wait_for_pushes(Duration::from_secs(5)).await);

        service.update_job(&job.id, Job { client_email: None, ..job.clone() }).unwrap();
        assert!(service.wait_for_pushes(Duration::from_secs(5)).await);
        service.sync_now().await.unwrap();
        assert_eq!(service.get_job(&job.id).unwrap().client_email, None, "Cleared email not brought back");

        let admin = Actor::admin();
        let cash = CompletionPatch { payment_method: Some(PaymentMethod::Cash), total_amount: Some(150.0), ..Default::default() };
        service.update_job_status(&job.id, JobStatus::Completed, &admin, Some(cash)).unwrap();
        assert!(service.wait_for_pushes(Duration::from_secs(5)).await);
        service.update_job_status(&job.id, JobStatus::Cancelled, &admin, None).unwrap();
        assert!(service.wait_for_pushes(Duration::from_secs(5)).await);
        service.sync_now().await.unwrap();
        let cancelled = service.get_job(&job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.completion_data, None, "Cancelled job carries no completion data");

        let remote = simulated_client(&shared).get_jobs().await.unwrap().data;
        assert_eq!(remote[0].client_email, None, "Cleared remotely too");
        assert_eq!(remote[0].completion_data, None);
    }

    /// Shared simulated backend whose first update fails with a transient error
    struct Flaky {
        inner: SimulatedRemote,
        failures_left: AtomicUsize
    }

    #[async_trait]
    impl RemoteStore for Flaky {
        async fn get_jobs(&self) -> Result<Versioned<Vec<Job>>, SyncError> {
            self.inner.get_jobs().await
        }

        async fn create_job(&self, job: &Job) -> Result<Versioned<Job>, SyncError> {
            self.inner.create_job(job).await
        }

        async fn update_job(&self, job_id: &str, patch: &Value) -> Result<Versioned<Job>, SyncError> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(SyncError::Transport("connection reset".to_string()));
            }
            self.inner.update_job(job_id, patch).await
        }

        async fn delete_job(&self, job_id: &str) -> Result<Versioned<bool>, SyncError> {
            self.inner.delete_job(job_id).await
        }

        async fn sync_status(&self) -> Result<SyncStatus, SyncError> {
            self.inner.sync_status().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retried_push_never_overtakes_a_newer_one() {
        let shared = LocalStorage::in_memory();
        let remote = Arc::new(Flaky {
            inner: SimulatedRemote::new(shared.clone(), Duration::ZERO),
            failures_left: AtomicUsize::new(0)
        });
        let client = SyncClient::new(remote.clone(), Duration::from_secs(2), RetryPolicy::exponential(3, Duration::from_millis(250)));
        let service = JobService::new(&Profile::in_memory(), config(), Some(client));
        let job = service.add_job(fields("Durand"));
        assert!(service.wait_for_pushes(Duration::from_secs(5)).await);

        remote.failures_left.store(1, Ordering::SeqCst);
        let worker = Actor::new("w1", "Karim");
        service.update_job_status(&job.id, JobStatus::Accepted, &worker, None).unwrap();
        service.update_job_status(&job.id, JobStatus::InProgress, &worker, None).unwrap();
        assert!(service.wait_for_pushes(Duration::from_secs(5)).await, "Both pushes settled");

        let observer = simulated_client(&shared);
        assert_eq!(observer.get_jobs().await.unwrap().data[0].status, JobStatus::InProgress, "Newest record stored");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(observer.get_jobs().await.unwrap().data[0].status, JobStatus::InProgress, "Not overwritten by the retry");

        service.sync_now().await.unwrap();
        assert_eq!(service.get_job(&job.id).unwrap().status, JobStatus::InProgress, "Latest local write survives");
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_reload_is_not_repeated_by_the_poller() {
        let profile = Profile::in_memory();
        let admin_tab = JobService::new(&profile, config(), None);
        let worker_tab = JobService::new(&profile, config(), None);
        admin_tab.start();
        worker_tab.start();
        let heard = listen(&worker_tab);

        admin_tab.force_refresh("manual");
        sleep(Duration::from_millis(50)).await;
        assert_eq!(heard.reloads.load(Ordering::SeqCst), 1, "Reloaded by the broadcast");

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(heard.reloads.load(Ordering::SeqCst), 1, "Poll finds nothing new");
    }
}
