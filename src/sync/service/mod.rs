//! Job service
//!
//! One instance per tab. It owns the tab's copy of the job store, persists every mutation to
//! the profile's durable store, then tells everyone else: other tabs of the profile through the
//! broadcaster and the poll trigger, other profiles through the remote. Incoming changes of
//! any kind are handled the same way, by reloading from the durable store.

pub mod notify;
pub mod persist;

pub use persist::{JOBS_KEY, NOTIFICATIONS_KEY};

use crate::jobs::types::job::{CompletionPatch, Job, JobFields, JobStatus, PaymentMethod};
use crate::jobs::types::notification::Notification;
use crate::jobs::types::report::{AllWorkersWeeklyReport, WeeklyFinancialReport};
use crate::jobs::types::update::{Actor, JobChange, JobUpdate};
use crate::jobs::util::id::generate_job_id;
use crate::jobs::util::report;
use crate::shared::util::config::SyncConfig;
use crate::sync::broadcaster::Broadcaster;
use crate::sync::error::SyncError;
use crate::sync::listener::JobListener;
use crate::sync::message::{SyncEvent, SyncMessage};
use crate::sync::poller::{ChangePoller, TRIGGER_KEY};
use crate::sync::profile::Profile;
use crate::sync::remote::SyncClient;
use crate::sync::storage::LocalStorage;

use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Default)]
struct State {
    jobs: HashMap<String, Job>,
    notifications: HashMap<Uuid, Notification>,
    /// Job ids with a remote push in flight, mapped to the newest push waiting behind it
    pending_pushes: HashMap<String, Option<Push>>
}

struct ServiceInner {
    tab_id: String,
    config: SyncConfig,
    storage: LocalStorage,
    broadcaster: Broadcaster,
    poller: ChangePoller,
    remote: Option<SyncClient>,
    state: Mutex<State>,
    listeners: Mutex<HashMap<String, Arc<dyn JobListener>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs `fut` on the current tokio runtime, or drops it when there is none
fn spawn_detached<F>(what: &str, fut: F) where F: Future<Output = ()> + Send + 'static {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => { handle.spawn(fut); },
        Err(_) => debug!("No runtime, skipping {what}")
    }
}

enum Push {
    Create(Job),
    Save(Job),
    Delete(String)
}

impl Push {
    fn job_id(&self) -> &str {
        match self {
            Push::Create(job) | Push::Save(job) => &job.id,
            Push::Delete(id) => id
        }
    }
}

async fn send_push(client: &SyncClient, push: &Push) {
    let result = match push {
        Push::Create(job) => client.create_job(job).await.map(|created| {
            if created.data.id != job.id {
                warn!("Remote stored job {} under id {}", job.id, created.data.id);
            }
        }),
        Push::Save(job) => client.update_job(job).await.map(|_| ()),
        Push::Delete(id) => client.delete_job(id).await.map(|_| ())
    };
    if let Err(err) = result {
        warn!("Remote push for job {} failed, keeping the local copy: {err}", push.job_id());
    }
}

#[derive(Clone)]
pub struct JobService {
    inner: Arc<ServiceInner>
}

impl JobService {
    /// A new tab on `profile`. Nothing runs in the background until `start`.
    pub fn new(profile: &Profile, config: SyncConfig, remote: Option<SyncClient>) -> JobService {
        let tab_id = format!("tab-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let storage = profile.storage().clone();
        let broadcaster = Broadcaster::new(profile, &config.broadcast_topic, &tab_id,
            config.storage_fallback, config.fallback_clear_delay());
        let poller = ChangePoller::new(&storage, &tab_id, config.poll_interval(), &[JOBS_KEY, NOTIFICATIONS_KEY]);

        let state = State {
            jobs: persist::load_jobs(&storage),
            notifications: persist::load_notifications(&storage),
            pending_pushes: HashMap::new()
        };
        info!("Tab {tab_id} loaded {} jobs and {} notifications", state.jobs.len(), state.notifications.len());

        JobService {
            inner: Arc::new(ServiceInner {
                tab_id,
                config,
                storage,
                broadcaster,
                poller,
                remote,
                state: Mutex::new(state),
                listeners: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new())
            })
        }
    }

    pub fn tab_id(&self) -> &str {
        &self.inner.tab_id
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    fn listeners(&self) -> Vec<Arc<dyn JobListener>> {
        lock(&self.inner.listeners).values().cloned().collect()
    }

    fn persist_jobs(&self, state: &State) {
        match persist::save_jobs(&self.inner.storage, &self.inner.tab_id, &state.jobs) {
            Ok(raw) => self.inner.poller.mark_written(JOBS_KEY, Some(&raw)),
            Err(err) => error!("Tab {} could not persist jobs: {err}", self.inner.tab_id)
        }
    }

    fn persist_notifications(&self, state: &State) {
        match persist::save_notifications(&self.inner.storage, &self.inner.tab_id, &state.notifications) {
            Ok(raw) => self.inner.poller.mark_written(NOTIFICATIONS_KEY, Some(&raw)),
            Err(err) => error!("Tab {} could not persist notifications: {err}", self.inner.tab_id)
        }
    }

    /// Store notifications, caller holds the state lock
    fn store_notifications(&self, state: &mut State, notifications: &[Notification]) {
        if notifications.is_empty() { return; }
        for notification in notifications {
            state.notifications.insert(notification.id, notification.clone());
        }
        self.persist_notifications(state);
    }

    /// Broadcast + poll trigger, the immediate wave
    fn emit(&self, event: SyncEvent, reason: &str) {
        self.inner.broadcaster.broadcast(event);
        if let Err(err) = self.inner.poller.trigger(reason) {
            warn!("Tab {} could not write the poll trigger: {err}", self.inner.tab_id);
        }
    }

    /// Repeat the signal shortly after, for tabs that missed the first wave
    fn schedule_second_wave(&self, reason: String) {
        let broadcaster = self.inner.broadcaster.clone();
        let poller = self.inner.poller.clone();
        let delay = self.inner.config.second_wave_delay();
        spawn_detached("second broadcast wave", async move {
            tokio::time::sleep(delay).await;
            broadcaster.force_refresh(&reason);
            if let Err(err) = poller.trigger(&reason) {
                debug!("Second wave trigger failed: {err}");
            }
        });
    }

    fn publish_notifications(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() { return; }
        let listeners = self.listeners();
        for notification in notifications {
            self.inner.broadcaster.broadcast(SyncEvent::NotificationCreated { notification: notification.clone() });
            for listener in &listeners {
                listener.on_notification(&notification);
            }
        }
    }

    /// Fire and forget. Failures are logged and the local state is kept. Pushes for one job
    /// go out one at a time in order, and a push waiting behind another is replaced by any
    /// newer one, so a retried older record never lands after a newer one.
    fn push(&self, push: Push) {
        let Some(client) = self.inner.remote.clone() else { return; };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, job {} stays local", push.job_id());
            return;
        };
        let job_id = push.job_id().to_string();
        {
            let mut state = self.state();
            if let Some(waiting) = state.pending_pushes.get_mut(&job_id) {
                debug!("Push for job {job_id} queued behind the one in flight");
                *waiting = Some(push);
                return;
            }
            state.pending_pushes.insert(job_id.clone(), None);
        }

        let service = self.clone();
        handle.spawn(async move {
            let mut next = Some(push);
            while let Some(push) = next {
                send_push(&client, &push).await;
                next = {
                    let mut state = service.state();
                    let queued = state.pending_pushes.get_mut(&job_id).and_then(Option::take);
                    if queued.is_none() {
                        state.pending_pushes.remove(&job_id);
                    }
                    queued
                };
            }
        });
    }

    /// Create a job, assigned to the worker named in `fields`
    pub fn add_job(&self, fields: JobFields) -> Job {
        let mut job = Job::from_fields(generate_job_id(), Utc::now(), fields);
        job.normalize_completion();
        let update = JobUpdate::new(&job.id, job.status, &Actor::admin(), JobChange::Created);
        let notifications = vec![notify::job_assigned(&job)];

        {
            let mut state = self.state();
            state.jobs.insert(job.id.clone(), job.clone());
            self.persist_jobs(&state);
            self.store_notifications(&mut state, &notifications);
        }
        info!("Tab {} created job {} for {}", self.inner.tab_id, job.id, job.worker_id);

        self.emit(SyncEvent::JobCreated { job: job.clone(), update: update.clone() }, &format!("job {} created", job.id));
        self.publish_notifications(notifications);
        for listener in self.listeners() {
            listener.on_job_update(&job, &update);
        }
        self.push(Push::Create(job.clone()));
        job
    }

    /// Move a job to `new_status`. A completion paid by bank transfer lands in
    /// `PendingApproval` instead of `Completed` until an admin approves it.
    pub fn update_job_status(&self, job_id: &str, new_status: JobStatus, actor: &Actor, data: Option<CompletionPatch>) -> Option<Job> {
        let (job, update, old, notifications) = {
            let mut state = self.state();
            let job = state.jobs.get_mut(job_id)?;
            let old = job.status;
            let now = Utc::now();

            if let Some(patch) = data {
                job.completion_data.get_or_insert_with(Default::default).apply(patch);
            }

            let bank_transfer = job.completion_data.as_ref()
                .map_or(false, |d| d.payment_method == PaymentMethod::BankTransfer);
            let status = if new_status == JobStatus::Completed && bank_transfer && old != JobStatus::PendingApproval {
                JobStatus::PendingApproval
            } else {
                new_status
            };
            if old != status && !old.is_known_transition(status) {
                warn!("Job {job_id}: unusual transition {old} -> {status} by {}", actor.id);
            }

            match status {
                JobStatus::Accepted => { job.accepted_at.get_or_insert(now); },
                JobStatus::InProgress => { job.started_at.get_or_insert(now); },
                JobStatus::Completed | JobStatus::PendingApproval => {
                    job.completed_at.get_or_insert(now);
                    if old == JobStatus::PendingApproval && status == JobStatus::Completed {
                        job.approved_at = Some(now);
                    }
                },
                JobStatus::Assigned | JobStatus::Cancelled => ()
            }
            job.status = status;
            job.normalize_completion();

            let change = if status.is_finished() && !old.is_finished() {
                JobChange::Completed { from: old, completion: job.completion_data.clone().unwrap_or_default() }
            } else {
                JobChange::StatusChanged { from: old }
            };
            let job = job.clone();
            let update = JobUpdate::new(job_id, status, actor, change);
            let notifications = notify::status_changed(old, &job, actor);

            self.persist_jobs(&state);
            self.store_notifications(&mut state, &notifications);
            (job, update, old, notifications)
        };
        info!("Tab {}: job {job_id} {old} -> {} by {}", self.inner.tab_id, job.status, actor.id);

        let reason = format!("job {job_id} {}", job.status);
        self.emit(SyncEvent::JobUpdated { job: job.clone(), update: update.clone() }, &reason);
        self.schedule_second_wave(reason);
        self.publish_notifications(notifications);
        for listener in self.listeners() {
            listener.on_job_update(&job, &update);
            if old != job.status {
                listener.on_job_status_change(job_id, old, job.status);
            }
            if new_status == JobStatus::Completed {
                listener.on_job_complete(&job);
            }
        }
        self.push(Push::Save(job.clone()));
        Some(job)
    }

    /// Admin approval of a bank transfer. `None` unless the job is pending approval.
    pub fn approve_pending_job(&self, job_id: &str, actor: &Actor) -> Option<Job> {
        if self.state().jobs.get(job_id)?.status != JobStatus::PendingApproval {
            return None;
        }
        self.update_job_status(job_id, JobStatus::Completed, actor, None)
    }

    /// Admin edit. Identity, lifecycle timestamps and completion data are kept from the stored job.
    pub fn update_job(&self, job_id: &str, record: Job) -> Option<Job> {
        let (job, update, old) = {
            let mut state = self.state();
            let existing = state.jobs.get(job_id)?;
            let old = existing.status;

            let mut job = record;
            job.id = existing.id.clone();
            job.created_at = existing.created_at;
            job.accepted_at = existing.accepted_at;
            job.started_at = existing.started_at;
            job.completed_at = existing.completed_at;
            job.approved_at = existing.approved_at;
            job.completion_data = existing.completion_data.clone();
            job.normalize_completion();

            let update = JobUpdate::new(job_id, job.status, &Actor::admin(), JobChange::Edited);
            state.jobs.insert(job.id.clone(), job.clone());
            self.persist_jobs(&state);
            (job, update, old)
        };
        debug!("Tab {} edited job {job_id}", self.inner.tab_id);

        self.emit(SyncEvent::JobUpdated { job: job.clone(), update: update.clone() }, &format!("job {job_id} edited"));
        for listener in self.listeners() {
            listener.on_job_update(&job, &update);
            if old != job.status {
                listener.on_job_status_change(job_id, old, job.status);
            }
        }
        self.push(Push::Save(job.clone()));
        Some(job)
    }

    /// Hand a job to another worker, who gets an assignment notification
    pub fn reassign_job(&self, job_id: &str, worker_id: &str, worker_name: &str, actor: &Actor) -> Option<Job> {
        let (job, update, notifications) = {
            let mut state = self.state();
            let job = state.jobs.get_mut(job_id)?;
            let change = JobChange::Reassigned {
                from_worker_id: std::mem::replace(&mut job.worker_id, worker_id.to_string()),
                from_worker_name: std::mem::replace(&mut job.worker_name, worker_name.to_string())
            };
            let job = job.clone();
            let update = JobUpdate::new(job_id, job.status, actor, change);
            let notifications = vec![notify::job_assigned(&job)];
            self.persist_jobs(&state);
            self.store_notifications(&mut state, &notifications);
            (job, update, notifications)
        };
        info!("Tab {}: job {job_id} reassigned to {worker_id}", self.inner.tab_id);

        self.emit(SyncEvent::JobUpdated { job: job.clone(), update: update.clone() }, &format!("job {job_id} reassigned"));
        self.publish_notifications(notifications);
        for listener in self.listeners() {
            listener.on_job_update(&job, &update);
        }
        self.push(Push::Save(job.clone()));
        Some(job)
    }

    pub fn delete_job(&self, job_id: &str) -> bool {
        let job = {
            let mut state = self.state();
            let Some(job) = state.jobs.remove(job_id) else { return false; };
            self.persist_jobs(&state);
            job
        };
        info!("Tab {} deleted job {job_id}", self.inner.tab_id);

        let update = JobUpdate::new(job_id, job.status, &Actor::admin(), JobChange::Deleted);
        self.emit(SyncEvent::JobDeleted { job: job.clone(), update: update.clone() }, &format!("job {job_id} deleted"));
        for listener in self.listeners() {
            listener.on_job_update(&job, &update);
        }
        self.push(Push::Delete(job_id.to_string()));
        true
    }

    /// Newest first
    pub fn get_all_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.state().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.state().jobs.get(job_id).cloned()
    }

    fn jobs_matching<F: Fn(&Job) -> bool>(&self, keep: F) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.state().jobs.values().filter(|j| keep(j)).cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn get_jobs_for_worker(&self, worker_id: &str) -> Vec<Job> {
        self.jobs_matching(|j| j.worker_id == worker_id)
    }

    /// Assigned, accepted and in progress jobs of a worker
    pub fn get_active_jobs_for_worker(&self, worker_id: &str) -> Vec<Job> {
        self.jobs_matching(|j| j.worker_id == worker_id && j.status.is_active())
    }

    /// Completed or pending approval, most recently finished first
    pub fn get_completed_jobs_for_worker(&self, worker_id: &str) -> Vec<Job> {
        let mut jobs = self.jobs_matching(|j| j.worker_id == worker_id && j.status.is_finished());
        jobs.sort_by(|a, b| b.finished_sort_key().cmp(&a.finished_sort_key()));
        jobs
    }

    pub fn get_pending_approval_jobs(&self) -> Vec<Job> {
        let mut jobs = self.jobs_matching(|j| j.status == JobStatus::PendingApproval);
        jobs.sort_by(|a, b| b.finished_sort_key().cmp(&a.finished_sort_key()));
        jobs
    }

    pub fn get_weekly_financial_report(&self, worker_id: &str, week_date: NaiveDate) -> WeeklyFinancialReport {
        report::weekly_financial_report(self.state().jobs.values(), worker_id, week_date)
    }

    pub fn get_all_workers_weekly_report(&self, week_date: NaiveDate) -> AllWorkersWeeklyReport {
        report::all_workers_weekly_report(self.state().jobs.values(), week_date)
    }

    /// Registering under an existing id replaces that listener
    pub fn add_listener(&self, id: &str, listener: Arc<dyn JobListener>) {
        lock(&self.inner.listeners).insert(id.to_string(), listener);
    }

    pub fn remove_listener(&self, id: &str) -> bool {
        lock(&self.inner.listeners).remove(id).is_some()
    }

    /// Newest first
    pub fn get_notifications_for_user(&self, user_id: &str) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self.state().notifications.values()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        notifications
    }

    pub fn get_unread_notification_count(&self, user_id: &str) -> usize {
        self.state().notifications.values().filter(|n| n.recipient_id == user_id && !n.read).count()
    }

    pub fn mark_notification_as_read(&self, id: Uuid) -> bool {
        let mut state = self.state();
        match state.notifications.get_mut(&id) {
            Some(notification) if !notification.read => notification.read = true,
            Some(_) => return true,
            None => return false
        }
        self.persist_notifications(&state);
        true
    }

    pub fn delete_notification(&self, id: Uuid) -> bool {
        let mut state = self.state();
        if state.notifications.remove(&id).is_none() {
            return false;
        }
        self.persist_notifications(&state);
        true
    }

    /// Remind the assigned worker of the appointment, `None` for an unknown job
    pub fn create_appointment_reminder(&self, job_id: &str) -> Option<Notification> {
        let notification = {
            let mut state = self.state();
            let notification = notify::appointment_reminder(state.jobs.get(job_id)?, Utc::now());
            self.store_notifications(&mut state, std::slice::from_ref(&notification));
            notification
        };
        self.publish_notifications(vec![notification.clone()]);
        Some(notification)
    }

    /// Re-read jobs and notifications from the durable store. Whatever was read counts as
    /// seen by the poller, so its next tick does not reload the same change again.
    fn reload(&self) {
        for key in [TRIGGER_KEY, JOBS_KEY, NOTIFICATIONS_KEY] {
            self.inner.poller.mark_written(key, self.inner.storage.get_item(key).as_deref());
        }
        let jobs = persist::load_jobs(&self.inner.storage);
        let notifications = persist::load_notifications(&self.inner.storage);
        let mut state = self.state();
        state.jobs = jobs;
        state.notifications = notifications;
    }

    fn notify_reloaded(&self) {
        for listener in self.listeners() {
            listener.on_jobs_reloaded();
        }
    }

    /// Reload locally and tell every other tab to do the same
    pub fn force_refresh(&self, reason: &str) {
        self.reload();
        self.inner.broadcaster.force_refresh(reason);
        if let Err(err) = self.inner.poller.trigger(reason) {
            warn!("Tab {} could not write the poll trigger: {err}", self.inner.tab_id);
        }
        self.notify_reloaded();
    }

    /// One immediate remote round. Returns whether the remote had moved on.
    pub async fn sync_now(&self) -> Result<bool, SyncError> {
        let Some(client) = &self.inner.remote else { return Ok(false); };
        let changed = client.check_for_changes().await?;
        if changed {
            self.pull_remote().await?;
        }
        Ok(changed)
    }

    /// Wait until every remote push started so far has settled. False on timeout.
    pub async fn wait_for_pushes(&self, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.state().pending_pushes.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        true
    }

    /// Replace the local jobs with the remote's. Jobs with a push in flight keep their
    /// local state. Returns whether anything changed locally.
    async fn pull_remote(&self) -> Result<bool, SyncError> {
        let Some(client) = &self.inner.remote else { return Ok(false); };
        let remote = match client.get_jobs().await {
            Ok(remote) => remote,
            Err(err) => {
                // Report a change again on the next poll
                client.invalidate();
                return Err(err);
            }
        };

        let changed = {
            let mut state = self.state();
            let mut jobs: HashMap<String, Job> = remote.data.into_iter().map(|j| (j.id.clone(), j)).collect();
            for id in state.pending_pushes.keys() {
                match state.jobs.get(id) {
                    Some(local) => { jobs.insert(id.clone(), local.clone()); },
                    None => { jobs.remove(id); }
                }
            }
            if jobs == state.jobs {
                false
            } else {
                state.jobs = jobs;
                self.persist_jobs(&state);
                true
            }
        };

        if changed {
            info!("Tab {} pulled remote version {}", self.inner.tab_id, remote.version);
            self.inner.broadcaster.force_refresh("remote changes");
            self.notify_reloaded();
        }
        Ok(changed)
    }

    fn handle_message(&self, message: SyncMessage) {
        debug!("Tab {} received {} from {}", self.inner.tab_id, message.event.name(), message.source);
        self.reload();

        let listeners = self.listeners();
        match &message.event {
            SyncEvent::JobCreated { job, update } | SyncEvent::JobDeleted { job, update } => {
                for listener in &listeners {
                    listener.on_job_update(job, update);
                }
            },
            SyncEvent::JobUpdated { job, update } => {
                for listener in &listeners {
                    listener.on_job_update(job, update);
                    if let Some(old) = update.previous_status().filter(|old| *old != update.status) {
                        listener.on_job_status_change(&job.id, old, update.status);
                    }
                    if update.completes_job() {
                        listener.on_job_complete(job);
                    }
                }
            },
            SyncEvent::NotificationCreated { notification } => {
                for listener in &listeners {
                    listener.on_notification(notification);
                }
            },
            SyncEvent::ForceRefresh { reason } => {
                debug!("Tab {} refreshing: {reason}", self.inner.tab_id);
                for listener in &listeners {
                    listener.on_jobs_reloaded();
                }
            }
        }
    }

    /// Start listening for other tabs, polling, and (with a remote) remote polling plus a
    /// one-off migration of local jobs the remote lacks followed by a first pull. Needs a
    /// tokio runtime, calling it twice is a no-op.
    pub fn start(&self) {
        let mut tasks = lock(&self.inner.tasks);
        if !tasks.is_empty() { return; }

        let weak = Arc::downgrade(&self.inner);
        let mut receiver = self.inner.broadcaster.subscribe();
        tasks.push(tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match weak.upgrade() {
                    Some(inner) => JobService { inner }.handle_message(message),
                    None => break
                }
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        self.inner.poller.on_change(&self.inner.tab_id, Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let service = JobService { inner };
                service.reload();
                service.notify_reloaded();
            }
        }));
        self.inner.poller.start();

        if let Some(client) = &self.inner.remote {
            let weak = Arc::downgrade(&self.inner);
            client.add_change_listener(&self.inner.tab_id, Arc::new(move |has_changes| {
                if !has_changes { return; }
                if let Some(inner) = weak.upgrade() {
                    let service = JobService { inner };
                    spawn_detached("remote pull", async move {
                        if let Err(err) = service.pull_remote().await {
                            warn!("Tab {} could not pull remote jobs: {err}", service.inner.tab_id);
                        }
                    });
                }
            }));
            client.start_polling();

            let client = client.clone();
            let jobs = self.get_all_jobs();
            let weak = Arc::downgrade(&self.inner);
            tasks.push(tokio::spawn(async move {
                if let Err(err) = client.migrate_local_data(&jobs).await {
                    warn!("Migration of local jobs failed: {err}");
                }
                // The migration read the remote version, so polling alone would miss what is already there
                if let Some(inner) = weak.upgrade() {
                    let service = JobService { inner };
                    if let Err(err) = service.pull_remote().await {
                        warn!("Tab {} could not pull remote jobs: {err}", service.inner.tab_id);
                    }
                }
            }));
        }
        debug!("Tab {} started", self.inner.tab_id);
    }

    /// Stop every background task and drop all listeners
    pub fn destroy(&self) {
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        self.inner.poller.destroy();
        if let Some(client) = &self.inner.remote {
            client.remove_change_listener(&self.inner.tab_id);
            client.stop_polling();
        }
        lock(&self.inner.listeners).clear();
        debug!("Tab {} destroyed", self.inner.tab_id);
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}
