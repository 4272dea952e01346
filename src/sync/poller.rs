//! Poll based change detector
//!
//! A plain "something changed, go re-check" signal that does not depend on the broadcast
//! channels. `trigger` stamps a dedicated key, and every tab re-reads the watched keys on a
//! fixed interval, calling its callbacks when any of them differs from the last value seen.

use crate::sync::error::StorageError;
use crate::sync::storage::LocalStorage;

use chrono::Utc;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const TRIGGER_KEY: &str = "locksmith_sync_trigger";

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

struct PollerInner {
    tab_id: String,
    storage: LocalStorage,
    interval: Duration,
    last_seen: Mutex<HashMap<String, Option<String>>>,
    callbacks: Mutex<HashMap<String, ChangeCallback>>,
    task: Mutex<Option<JoinHandle<()>>>
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone)]
pub struct ChangePoller {
    inner: Arc<PollerInner>
}

impl ChangePoller {
    /// Watches the trigger key plus `extra_keys`, starting from their current values
    pub fn new(storage: &LocalStorage, tab_id: &str, interval: Duration, extra_keys: &[&str]) -> ChangePoller {
        let last_seen = std::iter::once(TRIGGER_KEY).chain(extra_keys.iter().copied())
            .map(|key| (key.to_string(), storage.get_item(key)))
            .collect();

        ChangePoller {
            inner: Arc::new(PollerInner {
                tab_id: tab_id.to_string(),
                storage: storage.clone(),
                interval,
                last_seen: Mutex::new(last_seen),
                callbacks: Mutex::new(HashMap::new()),
                task: Mutex::new(None)
            })
        }
    }

    /// Tell every other tab to re-check. The calling tab does not get its own signal.
    pub fn trigger(&self, reason: &str) -> Result<(), StorageError> {
        let value = format!("{}|{}", Utc::now().timestamp_millis(), reason);
        self.inner.storage.set_item(&self.inner.tab_id, TRIGGER_KEY, &value)?;
        self.mark_written(TRIGGER_KEY, Some(&value));
        Ok(())
    }

    /// Record a write made by this tab so the next tick does not report it back
    pub fn mark_written(&self, key: &str, value: Option<&str>) {
        if let Some(seen) = lock(&self.inner.last_seen).get_mut(key) {
            *seen = value.map(str::to_string);
        }
    }

    pub fn on_change(&self, id: &str, callback: ChangeCallback) {
        lock(&self.inner.callbacks).insert(id.to_string(), callback);
    }

    /// One poll tick. Returns whether a change was detected (and callbacks were run).
    pub fn check_now(&self) -> bool {
        PollerInner::check(&self.inner)
    }

    /// Start the interval timer. Needs a tokio runtime, calling it twice is a no-op.
    pub fn start(&self) {
        let mut task = lock(&self.inner.task);
        if task.is_some() { return; }

        let weak: Weak<PollerInner> = Arc::downgrade(&self.inner);
        let period = self.inner.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => { PollerInner::check(&inner); },
                    None => break
                }
            }
        }));
        debug!("Tab {} polling every {:?}", self.inner.tab_id, period);
    }

    /// Stop the timer and drop every callback
    pub fn destroy(&self) {
        if let Some(task) = lock(&self.inner.task).take() {
            task.abort();
        }
        lock(&self.inner.callbacks).clear();
    }
}

impl PollerInner {
    fn check(inner: &Arc<PollerInner>) -> bool {
        let mut changed = Vec::new();
        {
            let mut last_seen = lock(&inner.last_seen);
            for (key, seen) in last_seen.iter_mut() {
                let current = inner.storage.get_item(key);
                if current != *seen {
                    changed.push(key.clone());
                    *seen = current;
                }
            }
        }
        if changed.is_empty() {
            trace!("Tab {} poll: nothing changed", inner.tab_id);
            return false;
        }

        debug!("Tab {} poll detected changes in {:?}", inner.tab_id, changed);
        // Run outside the lock, callbacks may call back into the poller
        let callbacks: Vec<ChangeCallback> = lock(&inner.callbacks).values().cloned().collect();
        for callback in callbacks {
            callback();
        }
        true
    }
}

impl Drop for PollerInner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn trigger_reaches_other_tabs_only() {
        let storage = LocalStorage::in_memory();
        let tab_a = ChangePoller::new(&storage, "tab-a", Duration::from_secs(1), &[]);
        let tab_b = ChangePoller::new(&storage, "tab-b", Duration::from_secs(1), &[]);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tab_b.on_change("view", Arc::new(move || { counter.fetch_add(1, Ordering::SeqCst); }));

        tab_a.trigger("job updated").unwrap();
        assert!(!tab_a.check_now(), "Sender does not see its own trigger");
        assert!(tab_b.check_now(), "Other tab sees the trigger");
        assert!(!tab_b.check_now(), "Same value is reported once");
        assert_eq!(hits.load(Ordering::SeqCst), 1, "Callback ran once");

        let stamp = storage.get_item(TRIGGER_KEY).unwrap();
        assert!(stamp.ends_with("|job updated"), "Trigger value is timestamp|reason");
    }

    #[test]
    fn watched_keys_are_diffed() {
        let storage = LocalStorage::in_memory();
        let poller = ChangePoller::new(&storage, "tab-a", Duration::from_secs(1), &["locksmith_jobs"]);

        storage.set_item("tab-b", "locksmith_jobs", "{}").unwrap();
        assert!(poller.check_now(), "Write by another tab detected");

        storage.set_item("tab-a", "locksmith_jobs", "{\"x\":1}").unwrap();
        poller.mark_written("locksmith_jobs", Some("{\"x\":1}"));
        assert!(!poller.check_now(), "Own acknowledged write ignored");

        storage.set_item("tab-b", "unwatched", "1").unwrap();
        assert!(!poller.check_now(), "Unwatched keys ignored");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_runs_callbacks_until_destroyed() {
        let storage = LocalStorage::in_memory();
        let poller = ChangePoller::new(&storage, "tab-a", Duration::from_secs(1), &[]);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        poller.on_change("view", Arc::new(move || { counter.fetch_add(1, Ordering::SeqCst); }));
        poller.start();

        storage.set_item("tab-b", TRIGGER_KEY, "1|first").unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "Change picked up within one interval");

        poller.destroy();
        storage.set_item("tab-b", TRIGGER_KEY, "2|second").unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "No callbacks after destroy");
    }
}
