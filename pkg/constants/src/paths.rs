//! Filesystem path constants.

/// Default config file path for the daemon.
pub const DEFAULT_CONFIG: &str = "/etc/hpa-tuner/config.yaml";

/// Default data directory for the state store.
pub const DEFAULT_DATA_DIR: &str = "/tmp/hpa-tuner-data";
