//! Typed access to the resources hpa-tuner reads and writes.
//!
//! The controller only depends on the [`AutoscalerStore`], [`TunerStore`]
//! and [`EventStore`] contracts. [`Registry`] implements all of them on top
//! of [`StateStore`] with optimistic `resource_version` checks.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use pkg_constants::registry::{
    AUTOSCALER_PREFIX, EVENT_PREFIX, MAX_EVENTS_PER_OBJECT, TUNER_PREFIX,
};
use pkg_types::event::TunerEvent;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::object::ObjectKey;
use pkg_types::tuner::{HpaTuner, HpaTunerStatus};

use crate::client::StateStore;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },
    #[error("conflict updating {kind} {key}: expected version {expected}, found {found}")]
    Conflict {
        kind: &'static str,
        key: ObjectKey,
        expected: u64,
        found: u64,
    },
    #[error("failed to decode {kind} {key}: {source}")]
    Codec {
        kind: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Read/update access to target autoscalers.
#[async_trait]
pub trait AutoscalerStore: Send + Sync {
    async fn get_autoscaler(&self, key: &ObjectKey)
    -> RegistryResult<Option<HorizontalPodAutoscaler>>;

    /// Set the autoscaler floor. Fails with `Conflict` when the stored
    /// version differs from `expected_version`.
    async fn update_autoscaler_min(
        &self,
        key: &ObjectKey,
        expected_version: u64,
        min_replicas: u32,
    ) -> RegistryResult<HorizontalPodAutoscaler>;
}

/// Read/update access to tuner policies and their status.
#[async_trait]
pub trait TunerStore: Send + Sync {
    async fn get_tuner(&self, key: &ObjectKey) -> RegistryResult<Option<HpaTuner>>;

    async fn list_tuner_keys(&self) -> RegistryResult<Vec<ObjectKey>>;

    /// Replace the tuner status. Fails with `Conflict` when the stored
    /// version differs from `expected_version`.
    async fn update_tuner_status(
        &self,
        key: &ObjectKey,
        expected_version: u64,
        status: &HpaTunerStatus,
    ) -> RegistryResult<HpaTuner>;
}

/// Append-only audit event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_event(&self, event: &TunerEvent) -> RegistryResult<()>;

    async fn list_events(&self, namespace: &str) -> RegistryResult<Vec<TunerEvent>>;
}

trait Versioned {
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Versioned for HpaTuner {
    fn version(&self) -> u64 {
        self.resource_version
    }
    fn set_version(&mut self, version: u64) {
        self.resource_version = version;
    }
}

impl Versioned for HorizontalPodAutoscaler {
    fn version(&self) -> u64 {
        self.resource_version
    }
    fn set_version(&mut self, version: u64) {
        self.resource_version = version;
    }
}

const TUNER_KIND: &str = "HpaTuner";
const AUTOSCALER_KIND: &str = "HorizontalPodAutoscaler";

/// Resource registry over the SlateDB state store.
///
/// Writes go through a process-wide lock so that the version check and the
/// put are atomic with respect to each other.
#[derive(Clone)]
pub struct Registry {
    store: StateStore,
    write_lock: Arc<Mutex<()>>,
}

impl Registry {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    async fn read<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        storage_key: &str,
    ) -> RegistryResult<Option<T>> {
        match self.store.get(storage_key).await? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|source| RegistryError::Codec {
                    kind,
                    key: storage_key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(
        &self,
        kind: &'static str,
        storage_key: &str,
        value: &T,
    ) -> RegistryResult<()> {
        let data = serde_json::to_vec(value).map_err(|source| RegistryError::Codec {
            kind,
            key: storage_key.to_string(),
            source,
        })?;
        self.store.put(storage_key, &data).await?;
        Ok(())
    }

    async fn list<T: DeserializeOwned>(&self, kind: &'static str, prefix: &str) -> RegistryResult<Vec<T>> {
        let entries = self.store.list_prefix(prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_slice(&value) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Skipping undecodable {} at {}: {}", kind, key, e);
                    None
                }
            })
            .collect())
    }

    /// Read-check-modify-write under the write lock.
    async fn update<T, F>(
        &self,
        kind: &'static str,
        prefix: &str,
        key: &ObjectKey,
        expected_version: u64,
        mutate: F,
    ) -> RegistryResult<T>
    where
        T: Versioned + Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let _guard = self.write_lock.lock().await;
        let storage_key = key.storage_key(prefix);
        let mut current: T = self
            .read(kind, &storage_key)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                kind,
                key: key.clone(),
            })?;
        if current.version() != expected_version {
            return Err(RegistryError::Conflict {
                kind,
                key: key.clone(),
                expected: expected_version,
                found: current.version(),
            });
        }
        mutate(&mut current);
        current.set_version(expected_version + 1);
        self.write(kind, &storage_key, &current).await?;
        Ok(current)
    }

    /// Create or replace a tuner's spec. Status and creation time of an
    /// existing tuner are preserved; they belong to the controller.
    pub async fn apply_tuner(&self, mut tuner: HpaTuner) -> RegistryResult<HpaTuner> {
        let _guard = self.write_lock.lock().await;
        let storage_key = tuner.key().storage_key(TUNER_PREFIX);
        match self.read::<HpaTuner>(TUNER_KIND, &storage_key).await? {
            Some(existing) => {
                tuner.status = existing.status;
                tuner.created_at = existing.created_at;
                tuner.resource_version = existing.resource_version + 1;
            }
            None => {
                tuner.status = HpaTunerStatus::default();
                tuner.created_at = Some(Utc::now());
                tuner.resource_version = 1;
            }
        }
        self.write(TUNER_KIND, &storage_key, &tuner).await?;
        Ok(tuner)
    }

    /// Create or replace an autoscaler, spec and observed status alike.
    pub async fn apply_autoscaler(
        &self,
        mut hpa: HorizontalPodAutoscaler,
    ) -> RegistryResult<HorizontalPodAutoscaler> {
        let _guard = self.write_lock.lock().await;
        let storage_key = hpa.key().storage_key(AUTOSCALER_PREFIX);
        match self
            .read::<HorizontalPodAutoscaler>(AUTOSCALER_KIND, &storage_key)
            .await?
        {
            Some(existing) => {
                hpa.created_at = existing.created_at;
                hpa.resource_version = existing.resource_version + 1;
            }
            None => {
                hpa.created_at = Some(Utc::now());
                hpa.resource_version = 1;
            }
        }
        self.write(AUTOSCALER_KIND, &storage_key, &hpa).await?;
        Ok(hpa)
    }

    pub async fn list_tuners(&self, namespace: Option<&str>) -> RegistryResult<Vec<HpaTuner>> {
        let prefix = namespaced_prefix(TUNER_PREFIX, namespace);
        self.list(TUNER_KIND, &prefix).await
    }

    pub async fn list_autoscalers(
        &self,
        namespace: Option<&str>,
    ) -> RegistryResult<Vec<HorizontalPodAutoscaler>> {
        let prefix = namespaced_prefix(AUTOSCALER_PREFIX, namespace);
        self.list(AUTOSCALER_KIND, &prefix).await
    }

    /// Delete a tuner. Returns false if it did not exist.
    pub async fn delete_tuner(&self, key: &ObjectKey) -> RegistryResult<bool> {
        self.delete(TUNER_PREFIX, key).await
    }

    /// Delete an autoscaler. Returns false if it did not exist.
    pub async fn delete_autoscaler(&self, key: &ObjectKey) -> RegistryResult<bool> {
        self.delete(AUTOSCALER_PREFIX, key).await
    }

    async fn delete(&self, prefix: &str, key: &ObjectKey) -> RegistryResult<bool> {
        let _guard = self.write_lock.lock().await;
        let storage_key = key.storage_key(prefix);
        if self.store.get(&storage_key).await?.is_none() {
            return Ok(false);
        }
        self.store.delete(&storage_key).await?;
        Ok(true)
    }
}

fn namespaced_prefix(prefix: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{}{}/", prefix, ns),
        None => prefix.to_string(),
    }
}

#[async_trait]
impl AutoscalerStore for Registry {
    async fn get_autoscaler(
        &self,
        key: &ObjectKey,
    ) -> RegistryResult<Option<HorizontalPodAutoscaler>> {
        self.read(AUTOSCALER_KIND, &key.storage_key(AUTOSCALER_PREFIX))
            .await
    }

    async fn update_autoscaler_min(
        &self,
        key: &ObjectKey,
        expected_version: u64,
        min_replicas: u32,
    ) -> RegistryResult<HorizontalPodAutoscaler> {
        self.update(
            AUTOSCALER_KIND,
            AUTOSCALER_PREFIX,
            key,
            expected_version,
            |hpa: &mut HorizontalPodAutoscaler| hpa.spec.min_replicas = min_replicas,
        )
        .await
    }
}

#[async_trait]
impl TunerStore for Registry {
    async fn get_tuner(&self, key: &ObjectKey) -> RegistryResult<Option<HpaTuner>> {
        self.read(TUNER_KIND, &key.storage_key(TUNER_PREFIX)).await
    }

    async fn list_tuner_keys(&self) -> RegistryResult<Vec<ObjectKey>> {
        let entries = self.store.list_prefix(TUNER_PREFIX).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, _)| ObjectKey::from_storage_key(TUNER_PREFIX, &key))
            .collect())
    }

    async fn update_tuner_status(
        &self,
        key: &ObjectKey,
        expected_version: u64,
        status: &HpaTunerStatus,
    ) -> RegistryResult<HpaTuner> {
        let status = status.clone();
        self.update(
            TUNER_KIND,
            TUNER_PREFIX,
            key,
            expected_version,
            move |tuner: &mut HpaTuner| tuner.status = status,
        )
        .await
    }
}

#[async_trait]
impl EventStore for Registry {
    /// Fold a repeat of the object's newest event into it, otherwise append
    /// and prune the object's history to `MAX_EVENTS_PER_OBJECT`.
    async fn append_event(&self, event: &TunerEvent) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let prefix = namespaced_prefix(EVENT_PREFIX, Some(&event.involved_object.namespace));
        let mut history: Vec<(String, TunerEvent)> = self
            .store
            .list_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                serde_json::from_slice::<TunerEvent>(&value)
                    .ok()
                    .map(|e| (key, e))
            })
            .filter(|(_, e)| e.involved_object == event.involved_object)
            .collect();
        history.sort_by_key(|(_, e)| e.timestamp);

        if let Some((key, newest)) = history.last_mut() {
            if newest.repeats(event) {
                newest.count = newest.count.saturating_add(event.count);
                newest.timestamp = newest.timestamp.max(event.timestamp);
                return self.write("Event", key.as_str(), &*newest).await;
            }
        }

        let storage_key = format!("{}{}", prefix, event.id);
        self.write("Event", &storage_key, event).await?;

        let excess = (history.len() + 1).saturating_sub(MAX_EVENTS_PER_OBJECT);
        for (key, _) in history.iter().take(excess) {
            self.store.delete(key).await?;
        }
        Ok(())
    }

    async fn list_events(&self, namespace: &str) -> RegistryResult<Vec<TunerEvent>> {
        let prefix = namespaced_prefix(EVENT_PREFIX, Some(namespace));
        let mut events: Vec<TunerEvent> = self.list("Event", &prefix).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::event::EventType;
    use pkg_types::hpa::{CrossVersionObjectReference, HPASpec, HPAStatus};
    use pkg_types::tuner::HpaTunerSpec;

    async fn registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_str().unwrap()).await.unwrap();
        (dir, Registry::new(store))
    }

    fn hpa(min: u32) -> HorizontalPodAutoscaler {
        HorizontalPodAutoscaler {
            name: "frontend".to_string(),
            namespace: "web".to_string(),
            spec: HPASpec {
                scale_target_ref: CrossVersionObjectReference {
                    kind: "Deployment".to_string(),
                    name: "frontend".to_string(),
                    api_version: Some("apps/v1".to_string()),
                },
                min_replicas: min,
                max_replicas: 20,
                target_cpu_utilization_percent: Some(80),
            },
            status: HPAStatus::default(),
            resource_version: 0,
            created_at: None,
        }
    }

    fn tuner(min: u32) -> HpaTuner {
        HpaTuner {
            name: "frontend-tuner".to_string(),
            namespace: "web".to_string(),
            spec: HpaTunerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    kind: "HorizontalPodAutoscaler".to_string(),
                    name: "frontend".to_string(),
                    api_version: None,
                },
                min_replicas: min,
                max_replicas: 20,
                downscale_forbidden_window_seconds: 30,
                upscale_forbidden_window_after_downscale_seconds: 600,
                use_decision_service: false,
                idle_when_unmeasured: true,
            },
            status: HpaTunerStatus::default(),
            resource_version: 0,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn update_min_bumps_version_and_detects_conflicts() {
        let (_dir, reg) = registry().await;
        let created = reg.apply_autoscaler(hpa(1)).await.unwrap();
        assert_eq!(created.resource_version, 1);

        let updated = reg
            .update_autoscaler_min(&created.key(), 1, 5)
            .await
            .unwrap();
        assert_eq!(updated.spec.min_replicas, 5);
        assert_eq!(updated.resource_version, 2);

        let err = reg
            .update_autoscaler_min(&created.key(), 1, 7)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Conflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_of_missing_resource_is_not_found() {
        let (_dir, reg) = registry().await;
        let err = reg
            .update_tuner_status(&ObjectKey::new("web", "ghost"), 0, &HpaTunerStatus::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn reapplying_tuner_preserves_status() {
        let (_dir, reg) = registry().await;
        let created = reg.apply_tuner(tuner(2)).await.unwrap();
        let status = HpaTunerStatus {
            last_up_scale_time: Some(Utc::now()),
            last_down_scale_time: None,
        };
        reg.update_tuner_status(&created.key(), created.resource_version, &status)
            .await
            .unwrap();

        let reapplied = reg.apply_tuner(tuner(4)).await.unwrap();
        assert_eq!(reapplied.spec.min_replicas, 4);
        assert_eq!(reapplied.status, status);
        assert_eq!(reapplied.resource_version, 3);
        assert_eq!(reapplied.created_at, created.created_at);
    }

    #[tokio::test]
    async fn lists_tuner_keys_and_deletes() {
        let (_dir, reg) = registry().await;
        reg.apply_tuner(tuner(2)).await.unwrap();
        let keys = reg.list_tuner_keys().await.unwrap();
        assert_eq!(keys, vec![ObjectKey::new("web", "frontend-tuner")]);

        assert!(reg.delete_tuner(&keys[0]).await.unwrap());
        assert!(!reg.delete_tuner(&keys[0]).await.unwrap());
        assert!(reg.get_tuner(&keys[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_are_listed_per_namespace_in_time_order() {
        let (_dir, reg) = registry().await;
        let key = ObjectKey::new("web", "frontend-tuner");
        let mut first = TunerEvent::new(key.clone(), EventType::Normal, "SuccessfulUpscaleMin", "a");
        first.timestamp = Utc::now() - chrono::Duration::seconds(5);
        let second = TunerEvent::new(key, EventType::Warning, "FailedProcessHpaTuner", "b");
        reg.append_event(&second).await.unwrap();
        reg.append_event(&first).await.unwrap();
        let other = TunerEvent::new(
            ObjectKey::new("batch", "t"),
            EventType::Normal,
            "SuccessfulDownscaleMin",
            "c",
        );
        reg.append_event(&other).await.unwrap();

        let events = reg.list_events("web").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "a");
        assert_eq!(events[1].message, "b");
    }

    #[tokio::test]
    async fn repeated_events_fold_into_one_record() {
        let (_dir, reg) = registry().await;
        let key = ObjectKey::new("web", "frontend-tuner");
        for _ in 0..5 {
            let event = TunerEvent::new(
                key.clone(),
                EventType::Warning,
                "FailedGetResource",
                "autoscaler web/frontend not found",
            );
            reg.append_event(&event).await.unwrap();
        }
        let other = TunerEvent::new(
            ObjectKey::new("web", "backend-tuner"),
            EventType::Warning,
            "FailedGetResource",
            "autoscaler web/frontend not found",
        );
        reg.append_event(&other).await.unwrap();

        let events = reg.list_events("web").await.unwrap();
        assert_eq!(events.len(), 2);
        let folded = events.iter().find(|e| e.involved_object == key).unwrap();
        assert_eq!(folded.count, 5);

        // a different message starts a new record
        let changed = TunerEvent::new(key.clone(), EventType::Warning, "FailedGetResource", "other");
        reg.append_event(&changed).await.unwrap();
        assert_eq!(reg.list_events("web").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn event_history_is_capped_per_object() {
        let (_dir, reg) = registry().await;
        let key = ObjectKey::new("web", "frontend-tuner");
        let start = Utc::now() - chrono::Duration::seconds(1000);
        let total = MAX_EVENTS_PER_OBJECT + 7;
        for i in 0..total {
            let mut event = TunerEvent::new(
                key.clone(),
                EventType::Normal,
                "SuccessfulUpscaleMin",
                format!("raised to {}", i),
            );
            event.timestamp = start + chrono::Duration::seconds(i as i64);
            reg.append_event(&event).await.unwrap();
        }

        let events = reg.list_events("web").await.unwrap();
        assert_eq!(events.len(), MAX_EVENTS_PER_OBJECT);
        assert_eq!(events[0].message, "raised to 7");
        assert_eq!(
            events.last().unwrap().message,
            format!("raised to {}", total - 1)
        );
    }
}
