//! Cross-tab broadcaster
//!
//! Messages go out on the profile's named topic and, as a fallback, through a durable
//! key whose mutation event every other tab observes. A tab never receives its own
//! messages, and a message arriving on both channels is handed out once.

use crate::sync::message::{SyncEvent, SyncMessage};
use crate::sync::profile::Profile;
use crate::sync::storage::{LocalStorage, StorageEvent};

use log::{debug, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

/// Durable key used by the fallback channel
pub const SYNC_MESSAGE_KEY: &str = "locksmith_sync_message";

const SEEN_CAPACITY: usize = 128;

#[derive(Clone)]
pub struct Broadcaster {
    tab_id: String,
    storage: LocalStorage,
    topic: broadcast::Sender<SyncMessage>,
    fallback: bool,
    clear_delay: Duration
}

impl Broadcaster {
    pub fn new(profile: &Profile, topic: &str, tab_id: &str, fallback: bool, clear_delay: Duration) -> Broadcaster {
        Broadcaster {
            tab_id: tab_id.to_string(),
            storage: profile.storage().clone(),
            topic: profile.topic(topic),
            fallback,
            clear_delay
        }
    }

    /// Fire and forget: nothing tells the sender whether any tab processed the message
    pub fn broadcast(&self, event: SyncEvent) -> SyncMessage {
        let message = SyncMessage::new(&self.tab_id, event);
        debug!("Tab {} broadcasting {} ({})", self.tab_id, message.event.name(), message.id);

        // Err only means no other tab is listening right now
        let _ = self.topic.send(message.clone());

        if self.fallback {
            self.write_fallback(&message);
        }
        message
    }

    pub fn force_refresh(&self, reason: &str) -> SyncMessage {
        self.broadcast(SyncEvent::ForceRefresh { reason: reason.to_string() })
    }

    pub fn subscribe(&self) -> BroadcastReceiver {
        BroadcastReceiver {
            tab_id: self.tab_id.clone(),
            topic: Some(self.topic.subscribe()),
            storage_events: Some(self.storage.subscribe()),
            seen: VecDeque::with_capacity(SEEN_CAPACITY)
        }
    }

    fn write_fallback(&self, message: &SyncMessage) {
        let encoded = match serde_json::to_string(message) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Could not encode sync message: {err}");
                return;
            }
        };
        if let Err(err) = self.storage.set_item(&self.tab_id, SYNC_MESSAGE_KEY, &encoded) {
            warn!("Fallback broadcast failed: {err}");
            return;
        }

        // Clear the key shortly after so a later re-read does not replay the message
        let storage = self.storage.clone();
        let tab_id = self.tab_id.clone();
        let clear = move || {
            if storage.get_item(SYNC_MESSAGE_KEY).as_deref() == Some(encoded.as_str()) {
                if let Err(err) = storage.remove_item(&tab_id, SYNC_MESSAGE_KEY) {
                    debug!("Could not clear fallback message: {err}");
                }
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let delay = self.clear_delay;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    clear();
                });
            },
            Err(_) => clear()
        }
    }
}

enum Incoming {
    Topic(Result<SyncMessage, RecvError>),
    Storage(Result<StorageEvent, RecvError>)
}

/// One tab's view of incoming broadcasts from both channels
pub struct BroadcastReceiver {
    tab_id: String,
    topic: Option<broadcast::Receiver<SyncMessage>>,
    storage_events: Option<broadcast::Receiver<StorageEvent>>,
    seen: VecDeque<Uuid>
}

impl BroadcastReceiver {
    /// Next message from another tab, `None` once both channels are closed
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            if self.topic.is_none() && self.storage_events.is_none() {
                return None;
            }

            let incoming = {
                let BroadcastReceiver { topic, storage_events, .. } = &mut *self;
                let from_topic = async {
                    match topic {
                        Some(topic) => topic.recv().await,
                        None => std::future::pending().await
                    }
                };
                let from_storage = async {
                    match storage_events {
                        Some(events) => events.recv().await,
                        None => std::future::pending().await
                    }
                };
                tokio::select! {
                    r = from_topic => Incoming::Topic(r),
                    r = from_storage => Incoming::Storage(r)
                }
            };

            let received = match incoming {
                Incoming::Topic(Ok(message)) => Some(message),
                Incoming::Storage(Ok(event)) => self.decode_storage_event(event),
                Incoming::Topic(Err(RecvError::Lagged(n))) | Incoming::Storage(Err(RecvError::Lagged(n))) => {
                    warn!("Tab {} missed {n} broadcasts", self.tab_id);
                    None
                },
                Incoming::Topic(Err(RecvError::Closed)) => {
                    self.topic = None;
                    None
                },
                Incoming::Storage(Err(RecvError::Closed)) => {
                    self.storage_events = None;
                    None
                }
            };

            if let Some(message) = received.and_then(|m| self.accept(m)) {
                return Some(message);
            }
        }
    }

    /// Drain whatever is already queued, without waiting
    pub fn try_recv(&mut self) -> Option<SyncMessage> {
        loop {
            let mut progressed = false;

            if let Some(topic) = &mut self.topic {
                match topic.try_recv() {
                    Ok(message) => {
                        progressed = true;
                        if let Some(message) = self.accept(message) { return Some(message); }
                    },
                    Err(TryRecvError::Lagged(_)) => progressed = true,
                    Err(TryRecvError::Closed) => self.topic = None,
                    Err(TryRecvError::Empty) => ()
                }
            }

            if let Some(storage_events) = &mut self.storage_events {
                match storage_events.try_recv() {
                    Ok(event) => {
                        progressed = true;
                        if let Some(message) = self.decode_storage_event(event).and_then(|m| self.accept(m)) {
                            return Some(message);
                        }
                    },
                    Err(TryRecvError::Lagged(_)) => progressed = true,
                    Err(TryRecvError::Closed) => self.storage_events = None,
                    Err(TryRecvError::Empty) => ()
                }
            }

            if !progressed { return None; }
        }
    }

    fn decode_storage_event(&self, event: StorageEvent) -> Option<SyncMessage> {
        if event.key != SYNC_MESSAGE_KEY || event.origin == self.tab_id {
            return None;
        }
        match serde_json::from_str::<SyncMessage>(event.new_value.as_deref()?) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!("Ignoring unreadable fallback message: {err}");
                None
            }
        }
    }

    fn accept(&mut self, message: SyncMessage) -> Option<SyncMessage> {
        if message.source == self.tab_id || self.seen.contains(&message.id) {
            return None;
        }
        if self.seen.len() == SEEN_CAPACITY {
            self.seen.pop_front();
        }
        self.seen.push_back(message.id);
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_channels_deliver_once() {
        let profile = Profile::in_memory();
        let sender = Broadcaster::new(&profile, "jobs", "tab-a", true, Duration::from_millis(100));
        let other = Broadcaster::new(&profile, "jobs", "tab-b", true, Duration::from_millis(100));
        let mut own = sender.subscribe();
        let mut incoming = other.subscribe();

        let sent = sender.force_refresh("manual");
        assert_eq!(incoming.try_recv().map(|m| m.id), Some(sent.id), "Other tab receives it");
        assert!(incoming.try_recv().is_none(), "Fallback copy suppressed");
        assert!(own.try_recv().is_none(), "Sender never hears itself");
        assert!(profile.storage().get_item(SYNC_MESSAGE_KEY).is_none(), "Fallback key cleared right away without a runtime");
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_alone_is_enough() {
        let profile = Profile::in_memory();
        let sender = Broadcaster::new(&profile, "one", "tab-a", true, Duration::from_millis(100));
        let other = Broadcaster::new(&profile, "two", "tab-b", true, Duration::from_millis(100));
        let mut incoming = other.subscribe();

        let sent = sender.force_refresh("fallback");
        assert_eq!(incoming.recv().await.map(|m| m.id), Some(sent.id), "Delivered through the store");
        assert!(profile.storage().get_item(SYNC_MESSAGE_KEY).is_some(), "Key still set");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(profile.storage().get_item(SYNC_MESSAGE_KEY).is_none(), "Cleared after the delay");
        assert!(incoming.try_recv().is_none(), "Clearing is not a message");
    }

    #[test]
    fn no_fallback_means_topic_only() {
        let profile = Profile::in_memory();
        let sender = Broadcaster::new(&profile, "one", "tab-a", false, Duration::from_millis(100));
        let other = Broadcaster::new(&profile, "two", "tab-b", false, Duration::from_millis(100));
        let mut incoming = other.subscribe();

        sender.force_refresh("quiet");
        assert!(incoming.try_recv().is_none(), "Different topic, nothing through the store");
        assert!(profile.storage().get_item(SYNC_MESSAGE_KEY).is_none());
    }
}
