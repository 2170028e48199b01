use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Put,
    Delete,
}

/// A single watch event representing a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub key: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

impl WatchEvent {
    pub fn matches(&self, prefix: &str) -> bool {
        prefix.is_empty() || self.key.starts_with(prefix)
    }
}

/// In-memory log of store mutations with monotonic sequence numbers.
/// Keeps a bounded window of recent events for late subscribers and
/// broadcasts new ones live.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    events: VecDeque<WatchEvent>,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events,
            })),
            sender,
        }
    }

    /// Record a new event. Called by StateStore on put/delete.
    pub async fn emit(&self, event_type: EventType, key: String, value: Option<Vec<u8>>) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            key,
            value,
        };
        if inner.events.len() >= inner.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Buffered events after `from_seq` whose key starts with `prefix`.
    pub async fn events_since(&self, from_seq: u64, prefix: &str) -> Vec<WatchEvent> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| e.seq > from_seq && e.matches(prefix))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}
