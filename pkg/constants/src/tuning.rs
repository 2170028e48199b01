//! Scaling policy defaults and limits.

/// Default period between two reconciliation cycles of one tuner.
pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 15;

/// Granularity of the controller's work queue.
pub const QUEUE_TICK_MILLIS: u64 = 1000;

/// Default upper bound on tuners reconciled at the same time.
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 8;

/// Utilization (percent) below which a target counts as idle.
pub const IDLE_UTILIZATION_PERCENT: u32 = 5;

/// Default time after an upscale before a downscale may be considered.
pub const DEFAULT_DOWNSCALE_FORBIDDEN_WINDOW_SECS: u32 = 300;

/// Default time after a downscale before an organic upscale is honored.
pub const DEFAULT_UPSCALE_FORBIDDEN_WINDOW_AFTER_DOWNSCALE_SECS: u32 = 300;

/// Accepted range for `downscale_forbidden_window_seconds`.
pub const DOWNSCALE_FORBIDDEN_WINDOW_RANGE: (u32, u32) = (1, 6000);

/// Accepted range for `upscale_forbidden_window_after_downscale_seconds`.
pub const UPSCALE_FORBIDDEN_WINDOW_RANGE: (u32, u32) = (1, 600);

/// Accepted range for the tuner's `min_replicas` and `max_replicas`.
pub const REPLICA_RANGE: (u32, u32) = (1, 1000);

/// Timeout for one decision-service request.
pub const DEFAULT_DECISION_TIMEOUT_SECS: u64 = 10;

/// Path of the decision-service endpoint, appended to the configured base URL.
pub const DECISION_SERVICE_PATH: &str = "/api/HorizontalPodAutoscaler";
