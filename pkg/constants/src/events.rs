//! Audit event reasons and sources.

/// The floor on a target autoscaler was raised.
pub const REASON_UPSCALE_MIN: &str = "SuccessfulUpscaleMin";

/// The floor on a target autoscaler was lowered.
pub const REASON_DOWNSCALE_MIN: &str = "SuccessfulDownscaleMin";

/// A tuner could not be processed or its decision could not be applied.
pub const REASON_FAILED_PROCESS: &str = "FailedProcessHpaTuner";

/// Component name stamped on every recorded event.
pub const EVENT_SOURCE: &str = "hpa-tuner";
