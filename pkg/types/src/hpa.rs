use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::ObjectKey;

// --- Scale target reference ---

/// Identifies the workload scaled by an autoscaler, or the autoscaler
/// tuned by an `HpaTuner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossVersionObjectReference {
    pub kind: String,
    pub name: String,
    #[serde(default, alias = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

// --- HPA status ---

/// Observed state, written by the native autoscaling mechanism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HPAStatus {
    #[serde(default, alias = "currentReplicas")]
    pub current_replicas: u32,
    #[serde(default, alias = "desiredReplicas")]
    pub desired_replicas: u32,
    /// Most recent utilization signal; absent when nothing was measured.
    #[serde(default, alias = "currentCPUUtilizationPercentage")]
    pub current_cpu_utilization_percent: Option<u32>,
    /// Informational only, never consulted by the scaling policy.
    #[serde(default, alias = "lastScaleTime")]
    pub last_scale_time: Option<DateTime<Utc>>,
}

// --- HPA spec ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HPASpec {
    #[serde(alias = "scaleTargetRef")]
    pub scale_target_ref: CrossVersionObjectReference,
    /// The floor enforced on the autoscaler. This is the only field the
    /// tuner ever writes.
    #[serde(default, alias = "minReplicas")]
    pub min_replicas: u32,
    #[serde(alias = "maxReplicas")]
    pub max_replicas: u32,
    #[serde(default, alias = "targetCPUUtilizationPercentage")]
    pub target_cpu_utilization_percent: Option<u32>,
}

// --- HPA ---

/// The target autoscaler whose floor is tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPodAutoscaler {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub spec: HPASpec,
    #[serde(default)]
    pub status: HPAStatus,
    /// Bumped by the store on every write; used for optimistic updates.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl HorizontalPodAutoscaler {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Short human-readable summary used in logs.
    pub fn summary(&self) -> String {
        let cpu = self
            .status
            .current_cpu_utilization_percent
            .map(|c| c.to_string())
            .unwrap_or_else(|| "NA".to_string());
        let target_cpu = self
            .spec
            .target_cpu_utilization_percent
            .map(|c| c.to_string())
            .unwrap_or_else(|| "NA".to_string());
        format!(
            "{} min={} pods={}/{} cpu={}/{}",
            self.name,
            self.spec.min_replicas,
            self.status.current_replicas,
            self.status.desired_replicas,
            cpu,
            target_cpu
        )
    }
}
