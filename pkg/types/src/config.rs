use serde::{Deserialize, Serialize};

/// Daemon configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// listen: 0.0.0.0:8080
/// data-dir: /var/lib/hpa-tuner/data
/// decision-service-endpoint: http://decision-service:8080
/// sync-period-secs: 15
/// enable-leader-election: true
/// log-level: info
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunerConfigFile {
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default, alias = "decision-service-endpoint")]
    pub decision_service_endpoint: Option<String>,
    #[serde(default, alias = "decision-timeout-secs")]
    pub decision_timeout_secs: Option<u64>,
    #[serde(default, alias = "sync-period-secs")]
    pub sync_period_secs: Option<u64>,
    #[serde(default, alias = "max-concurrent-reconciles")]
    pub max_concurrent_reconciles: Option<usize>,
    #[serde(default, alias = "enable-leader-election")]
    pub enable_leader_election: Option<bool>,
    #[serde(default, alias = "server-id")]
    pub server_id: Option<String>,
    #[serde(default, alias = "log-level")]
    pub log_level: Option<String>,
    #[serde(default, alias = "log-format")]
    pub log_format: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
