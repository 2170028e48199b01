//! Scaling policy for the autoscaler floor.
//!
//! [`evaluate`] is a pure function of the tuner policy, its transition
//! history, the observed autoscaler and an optional advisory minimum. It
//! decides whether the floor (`spec.min_replicas` of the autoscaler) should
//! move:
//!
//! ```text
//! if recently downscaled (now < last_down + upscale_window):
//!     advisory > floor  => RaiseFloorTo(advisory)
//!     otherwise         => NoAction
//!
//! candidate = max(advisory, policy.min, desired)
//! candidate > floor     => RaiseFloorTo(candidate)
//!
//! if floor > policy.min and now >= last_up + downscale_window and idle:
//!     target = max(policy.min, advisory)
//!     target != floor   => LowerFloorTo(target)
//!
//! NoAction
//! ```
//!
//! Equality never triggers a transition.

use chrono::{DateTime, Duration, Utc};

use pkg_constants::tuning::IDLE_UTILIZATION_PERCENT;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::tuner::{HpaTunerSpec, HpaTunerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    NoAction,
    RaiseFloorTo(u32),
    LowerFloorTo(u32),
}

impl ScalingAction {
    pub fn target(&self) -> Option<u32> {
        match self {
            ScalingAction::NoAction => None,
            ScalingAction::RaiseFloorTo(n) | ScalingAction::LowerFloorTo(n) => Some(*n),
        }
    }
}

/// True while the post-downscale settle period is running.
pub fn recently_downscaled(
    spec: &HpaTunerSpec,
    status: &HpaTunerStatus,
    now: DateTime<Utc>,
) -> bool {
    let window = Duration::seconds(spec.upscale_forbidden_window_after_downscale_seconds as i64);
    status
        .last_down_scale_time
        .is_some_and(|last| now < last + window)
}

/// True once the downscale forbidden window has passed since the last
/// upscale. Without a recorded upscale the window never counts as elapsed.
pub fn downscale_window_elapsed(
    spec: &HpaTunerSpec,
    status: &HpaTunerStatus,
    now: DateTime<Utc>,
) -> bool {
    let window = Duration::seconds(spec.downscale_forbidden_window_seconds as i64);
    status
        .last_up_scale_time
        .is_some_and(|last| now >= last + window)
}

/// Utilization below the idle threshold. A missing reading counts as idle
/// unless the tuner opts out via `idle_when_unmeasured`.
pub fn is_idle(spec: &HpaTunerSpec, hpa: &HorizontalPodAutoscaler) -> bool {
    match hpa.status.current_cpu_utilization_percent {
        Some(util) => util < IDLE_UTILIZATION_PERCENT,
        None => spec.idle_when_unmeasured,
    }
}

/// Decide whether the floor on `hpa` should change.
pub fn evaluate(
    spec: &HpaTunerSpec,
    status: &HpaTunerStatus,
    hpa: &HorizontalPodAutoscaler,
    advisory: Option<u32>,
    now: DateTime<Utc>,
) -> ScalingAction {
    let floor = hpa.spec.min_replicas;

    if recently_downscaled(spec, status, now) {
        return match advisory {
            Some(advised) if advised > floor => ScalingAction::RaiseFloorTo(advised),
            _ => ScalingAction::NoAction,
        };
    }

    let candidate = advisory
        .unwrap_or(0)
        .max(spec.min_replicas)
        .max(hpa.status.desired_replicas);
    if candidate > floor {
        return ScalingAction::RaiseFloorTo(candidate);
    }

    let elevated = spec.min_replicas < floor;
    if elevated && downscale_window_elapsed(spec, status, now) && is_idle(spec, hpa) {
        let target = spec.min_replicas.max(advisory.unwrap_or(0));
        if target != floor {
            return ScalingAction::LowerFloorTo(target);
        }
    }

    ScalingAction::NoAction
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::hpa::{CrossVersionObjectReference, HPASpec, HPAStatus};

    fn spec(min: u32) -> HpaTunerSpec {
        HpaTunerSpec {
            scale_target_ref: CrossVersionObjectReference {
                kind: "HorizontalPodAutoscaler".to_string(),
                name: "frontend".to_string(),
                api_version: None,
            },
            min_replicas: min,
            max_replicas: 1000,
            downscale_forbidden_window_seconds: 30,
            upscale_forbidden_window_after_downscale_seconds: 600,
            use_decision_service: true,
            idle_when_unmeasured: true,
        }
    }

    fn hpa(floor: u32, desired: u32, util: Option<u32>) -> HorizontalPodAutoscaler {
        HorizontalPodAutoscaler {
            name: "frontend".to_string(),
            namespace: "web".to_string(),
            spec: HPASpec {
                scale_target_ref: CrossVersionObjectReference {
                    kind: "Deployment".to_string(),
                    name: "frontend".to_string(),
                    api_version: None,
                },
                min_replicas: floor,
                max_replicas: 1000,
                target_cpu_utilization_percent: Some(20),
            },
            status: HPAStatus {
                current_replicas: desired,
                desired_replicas: desired,
                current_cpu_utilization_percent: util,
                last_scale_time: None,
            },
            resource_version: 1,
            created_at: None,
        }
    }

    fn ago(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
        Some(now - Duration::seconds(secs))
    }

    /// Status after applying `action` at `now`, as the controller would.
    fn apply(
        action: ScalingAction,
        status: &HpaTunerStatus,
        target: &HorizontalPodAutoscaler,
        now: DateTime<Utc>,
    ) -> (HpaTunerStatus, HorizontalPodAutoscaler) {
        let mut status = status.clone();
        let mut target = target.clone();
        match action {
            ScalingAction::RaiseFloorTo(n) => {
                status.last_up_scale_time = Some(now);
                target.spec.min_replicas = n;
            }
            ScalingAction::LowerFloorTo(n) => {
                status.last_down_scale_time = Some(now);
                target.spec.min_replicas = n;
            }
            ScalingAction::NoAction => {}
        }
        (status, target)
    }

    #[test]
    fn raises_floor_to_policy_baseline() {
        let now = Utc::now();
        let action = evaluate(&spec(5), &HpaTunerStatus::default(), &hpa(1, 1, None), None, now);
        assert_eq!(action, ScalingAction::RaiseFloorTo(5));
    }

    #[test]
    fn raise_tracks_highest_signal() {
        let now = Utc::now();
        let status = HpaTunerStatus::default();
        // desired wins
        assert_eq!(
            evaluate(&spec(2), &status, &hpa(1, 7, Some(50)), Some(4), now),
            ScalingAction::RaiseFloorTo(7)
        );
        // advisory wins
        assert_eq!(
            evaluate(&spec(2), &status, &hpa(1, 3, Some(50)), Some(13), now),
            ScalingAction::RaiseFloorTo(13)
        );
    }

    #[test]
    fn advisory_overrides_post_downscale_guard() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: None,
            last_down_scale_time: ago(now, 3),
        };
        let action = evaluate(&spec(1), &status, &hpa(1, 1, None), Some(3), now);
        assert_eq!(action, ScalingAction::RaiseFloorTo(3));
    }

    #[test]
    fn guard_suppresses_organic_upscale() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: None,
            last_down_scale_time: ago(now, 3),
        };
        // desired and baseline both above the floor, but no higher advisory
        assert_eq!(
            evaluate(&spec(4), &status, &hpa(1, 9, Some(90)), None, now),
            ScalingAction::NoAction
        );
        assert_eq!(
            evaluate(&spec(4), &status, &hpa(2, 9, Some(90)), Some(2), now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn guard_expires_after_window() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: None,
            last_down_scale_time: ago(now, 600),
        };
        assert_eq!(
            evaluate(&spec(4), &status, &hpa(1, 1, None), None, now),
            ScalingAction::RaiseFloorTo(4)
        );
    }

    #[test]
    fn cooldown_blocked_inside_forbidden_window() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 10),
            last_down_scale_time: None,
        };
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(3, 1, Some(2)), None, now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn cooldown_allowed_when_window_elapsed_and_unmeasured() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: None,
        };
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(3, 1, None), None, now),
            ScalingAction::LowerFloorTo(1)
        );
    }

    #[test]
    fn cooldown_releases_floor_the_autoscaler_has_clamped_to() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: None,
        };
        // the native autoscaler never reports desired below its own min
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(3, 3, None), None, now),
            ScalingAction::LowerFloorTo(1)
        );
        assert_eq!(
            evaluate(&spec(2), &status, &hpa(8, 8, Some(1)), Some(4), now),
            ScalingAction::LowerFloorTo(4)
        );
    }

    #[test]
    fn clamped_desired_does_not_reraise_during_guard() {
        let now = Utc::now();
        let lowered = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: ago(now, 5),
        };
        // desired still reports the old floor right after the release
        assert_eq!(
            evaluate(&spec(1), &lowered, &hpa(1, 3, None), None, now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn cooldown_window_boundary_is_inclusive() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 30),
            last_down_scale_time: None,
        };
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(3, 1, Some(0)), None, now),
            ScalingAction::LowerFloorTo(1)
        );
    }

    #[test]
    fn cooldown_requires_idle() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: None,
        };
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(3, 1, Some(5)), None, now),
            ScalingAction::NoAction
        );
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(3, 1, Some(4)), None, now),
            ScalingAction::LowerFloorTo(1)
        );
    }

    #[test]
    fn cooldown_requires_recorded_upscale() {
        let now = Utc::now();
        assert_eq!(
            evaluate(&spec(1), &HpaTunerStatus::default(), &hpa(3, 1, None), None, now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn unmeasured_utilization_can_opt_out_of_idle() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: None,
        };
        let mut s = spec(1);
        s.idle_when_unmeasured = false;
        assert_eq!(
            evaluate(&s, &status, &hpa(3, 1, None), None, now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn advisory_holds_floor_above_baseline_on_the_way_down() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: None,
        };
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(10, 1, None), Some(4), now),
            ScalingAction::LowerFloorTo(4)
        );
        // advisory never undercuts the baseline
        assert_eq!(
            evaluate(&spec(3), &status, &hpa(10, 1, None), Some(1), now),
            ScalingAction::LowerFloorTo(3)
        );
        // advisory equal to the floor keeps it
        assert_eq!(
            evaluate(&spec(1), &status, &hpa(10, 1, None), Some(10), now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn floor_at_or_below_baseline_is_left_alone() {
        let now = Utc::now();
        let status = HpaTunerStatus {
            last_up_scale_time: ago(now, 3600),
            last_down_scale_time: None,
        };
        assert_eq!(
            evaluate(&spec(3), &status, &hpa(3, 1, None), None, now),
            ScalingAction::NoAction
        );
    }

    #[test]
    fn settled_floor_yields_no_action() {
        let now = Utc::now();
        // none of these histories allows a cooldown yet
        let histories = [
            HpaTunerStatus::default(),
            HpaTunerStatus {
                last_up_scale_time: ago(now, 10),
                last_down_scale_time: None,
            },
            HpaTunerStatus {
                last_up_scale_time: ago(now, 3600),
                last_down_scale_time: ago(now, 1),
            },
        ];
        for history in &histories {
            for min in [1u32, 3, 8] {
                for desired in [0u32, 2, 8, 12] {
                    for advisory in [None, Some(1), Some(8), Some(12)] {
                        for util in [None, Some(1), Some(50)] {
                            let floor = min.max(desired).max(advisory.unwrap_or(0));
                            let action =
                                evaluate(&spec(min), history, &hpa(floor, desired, util), advisory, now);
                            assert_eq!(
                                action,
                                ScalingAction::NoAction,
                                "min={} desired={} advisory={:?} util={:?}",
                                min,
                                desired,
                                advisory,
                                util
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn second_evaluation_after_transition_is_no_action() {
        let now = Utc::now();
        let cases = [
            (spec(5), HpaTunerStatus::default(), hpa(1, 1, None), None),
            (
                spec(1),
                HpaTunerStatus {
                    last_up_scale_time: None,
                    last_down_scale_time: ago(now, 3),
                },
                hpa(1, 1, None),
                Some(3),
            ),
            (
                spec(1),
                HpaTunerStatus {
                    last_up_scale_time: ago(now, 3600),
                    last_down_scale_time: None,
                },
                hpa(3, 1, None),
                None,
            ),
            (
                spec(2),
                HpaTunerStatus {
                    last_up_scale_time: ago(now, 3600),
                    last_down_scale_time: ago(now, 7200),
                },
                hpa(9, 1, Some(1)),
                Some(4),
            ),
        ];
        for (s, status, target, advisory) in cases {
            let first = evaluate(&s, &status, &target, advisory, now);
            assert_ne!(first, ScalingAction::NoAction);
            let (status, target) = apply(first, &status, &target, now);
            assert_eq!(
                evaluate(&s, &status, &target, advisory, now),
                ScalingAction::NoAction
            );
        }
    }

    #[test]
    fn downscale_only_after_window_and_idle() {
        let now = Utc::now();
        for up_secs in [0i64, 10, 29, 30, 31, 3600] {
            for util in [None, Some(0), Some(4), Some(5), Some(80)] {
                let status = HpaTunerStatus {
                    last_up_scale_time: ago(now, up_secs),
                    last_down_scale_time: None,
                };
                let target = hpa(6, 1, util);
                if let ScalingAction::LowerFloorTo(_) =
                    evaluate(&spec(1), &status, &target, None, now)
                {
                    assert!(downscale_window_elapsed(&spec(1), &status, now));
                    assert!(is_idle(&spec(1), &target));
                }
            }
        }
    }
}
