use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pkg_constants::events::EVENT_SOURCE;

use crate::object::ObjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// An audit record attached to a tuner.
/// Stored at `/registry/events/<namespace>/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerEvent {
    pub id: String,
    pub involved_object: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub source: String,
    /// Occurrences folded into this record.
    #[serde(default = "default_count")]
    pub count: u32,
    pub timestamp: DateTime<Utc>,
}

fn default_count() -> u32 {
    1
}

impl TunerEvent {
    pub fn new(
        involved_object: ObjectKey,
        event_type: EventType,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            involved_object,
            event_type,
            reason: reason.to_string(),
            message: message.into(),
            source: EVENT_SOURCE.to_string(),
            count: 1,
            timestamp: Utc::now(),
        }
    }

    /// Whether `other` reports the same thing about the same object.
    pub fn repeats(&self, other: &TunerEvent) -> bool {
        self.involved_object == other.involved_object
            && self.event_type == other.event_type
            && self.reason == other.reason
            && self.message == other.message
    }
}
