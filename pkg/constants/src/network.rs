//! Network-related constants.

/// Default address the hpa-tuner daemon listens on.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default API server address used by `hpa-tunerctl`.
pub const DEFAULT_API_ADDR: &str = "http://127.0.0.1:8080";
