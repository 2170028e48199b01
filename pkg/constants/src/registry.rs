//! Key layout of resources in the state store.
//!
//! Namespaced resources live at `<prefix><namespace>/<name>`.

/// Prefix for target autoscalers.
pub const AUTOSCALER_PREFIX: &str = "/registry/horizontalpodautoscalers/";

/// Prefix for tuner resources.
pub const TUNER_PREFIX: &str = "/registry/hpatuners/";

/// Prefix for audit events. Events are keyed by `<namespace>/<event-id>`.
pub const EVENT_PREFIX: &str = "/registry/events/";

/// Events kept per involved object; older ones are pruned on append.
pub const MAX_EVENTS_PER_OBJECT: usize = 50;
