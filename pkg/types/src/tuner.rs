use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pkg_constants::tuning::{
    DEFAULT_DOWNSCALE_FORBIDDEN_WINDOW_SECS, DEFAULT_UPSCALE_FORBIDDEN_WINDOW_AFTER_DOWNSCALE_SECS,
};

use crate::hpa::CrossVersionObjectReference;
use crate::object::ObjectKey;

// --- Tuner status ---

/// Transition history, written only by the tuner controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HpaTunerStatus {
    /// Last time the floor was raised.
    #[serde(default, alias = "lastUpScaleTime")]
    pub last_up_scale_time: Option<DateTime<Utc>>,
    /// Last time the floor was lowered.
    #[serde(default, alias = "lastDownScaleTime")]
    pub last_down_scale_time: Option<DateTime<Utc>>,
}

// --- Tuner spec ---

/// User-authored tuning policy for one target autoscaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpaTunerSpec {
    /// The autoscaler being tuned. It lives in the tuner's namespace.
    #[serde(alias = "scaleTargetRef")]
    pub scale_target_ref: CrossVersionObjectReference,
    /// Baseline floor the target returns to after cooldown.
    #[serde(default = "default_min_replicas", alias = "minReplicas")]
    pub min_replicas: u32,
    #[serde(alias = "maxReplicas")]
    pub max_replicas: u32,
    /// Minimum time after an upscale before a downscale may be considered.
    #[serde(
        default = "default_downscale_window",
        alias = "downscaleForbiddenWindowSeconds"
    )]
    pub downscale_forbidden_window_seconds: u32,
    /// Minimum time after a downscale before an organic upscale is honored.
    #[serde(
        default = "default_upscale_window",
        alias = "upscaleForbiddenWindowAfterDownscaleSeconds"
    )]
    pub upscale_forbidden_window_after_downscale_seconds: u32,
    #[serde(default, alias = "useDecisionService")]
    pub use_decision_service: bool,
    /// Whether a missing utilization reading counts as idle.
    #[serde(default = "default_true", alias = "idleWhenUnmeasured")]
    pub idle_when_unmeasured: bool,
}

fn default_min_replicas() -> u32 {
    1
}
fn default_downscale_window() -> u32 {
    DEFAULT_DOWNSCALE_FORBIDDEN_WINDOW_SECS
}
fn default_upscale_window() -> u32 {
    DEFAULT_UPSCALE_FORBIDDEN_WINDOW_AFTER_DOWNSCALE_SECS
}
fn default_true() -> bool {
    true
}

// --- Tuner ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpaTuner {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub spec: HpaTunerSpec,
    #[serde(default)]
    pub status: HpaTunerStatus,
    /// Bumped by the store on every write; used for optimistic updates.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl HpaTuner {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Identity of the autoscaler this tuner manages.
    pub fn target_key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.spec.scale_target_ref.name)
    }
}
