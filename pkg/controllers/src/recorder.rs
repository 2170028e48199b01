use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use pkg_metrics::{MetricsRegistry, PERSIST_ERRORS_TOTAL};
use pkg_state::registry::EventStore;
use pkg_types::event::{EventType, TunerEvent};

/// Sink for audit events emitted while reconciling.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: TunerEvent);
}

/// Logs each event and persists it under `/registry/events/`.
///
/// A failed write is logged and counted; it never fails the reconcile.
pub struct StoreEventRecorder {
    store: Arc<dyn EventStore>,
    metrics: Arc<MetricsRegistry>,
}

impl StoreEventRecorder {
    pub fn new(store: Arc<dyn EventStore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { store, metrics }
    }
}

#[async_trait]
impl EventRecorder for StoreEventRecorder {
    async fn record(&self, event: TunerEvent) {
        match event.event_type {
            EventType::Normal => info!(
                "[{}] {} {}: {}",
                event.involved_object, event.event_type, event.reason, event.message
            ),
            EventType::Warning => warn!(
                "[{}] {} {}: {}",
                event.involved_object, event.event_type, event.reason, event.message
            ),
        }
        if let Err(e) = self.store.append_event(&event).await {
            warn!(
                "Failed to persist event {} for {}: {}",
                event.reason, event.involved_object, e
            );
            self.metrics
                .counter_inc(PERSIST_ERRORS_TOTAL, &[("resource", "event")]);
        }
    }
}
