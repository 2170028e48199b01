use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

use pkg_constants::network::DEFAULT_LISTEN_ADDR;
use pkg_constants::paths::{DEFAULT_CONFIG, DEFAULT_DATA_DIR};
use pkg_constants::tuning::{
    DEFAULT_DECISION_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_SYNC_PERIOD_SECS,
};
use pkg_types::config::TunerConfigFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "hpa-tuner",
    about = "Keeps horizontal pod autoscaler floors in step with load"
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Address for the API and /metrics
    #[arg(long, env = "METRICS_ADDR")]
    pub listen: Option<String>,

    /// Base URL of the scaling decision service; empty disables it
    #[arg(long, env = "DECISION_SERVICE_ENDPOINT")]
    pub decision_service_endpoint: Option<String>,

    /// Timeout for one decision service request
    #[arg(long)]
    pub decision_timeout_secs: Option<u64>,

    /// Seconds between evaluations of one tuner
    #[arg(long)]
    pub sync_period_secs: Option<u64>,

    /// Upper bound on tuners reconciled at the same time
    #[arg(long)]
    pub max_concurrent_reconciles: Option<usize>,

    /// Only reconcile while holding the leader lease
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    pub enable_leader_election: Option<bool>,

    /// Lease holder identity (defaults to a random id)
    #[arg(long)]
    pub server_id: Option<String>,

    /// Log filter, e.g. `info` or `hpa_tuner=debug`; RUST_LOG wins when set
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Effective daemon settings after merging CLI, config file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen: SocketAddr,
    pub data_dir: String,
    pub decision_service_endpoint: Option<String>,
    pub decision_timeout: Duration,
    pub sync_period: Duration,
    pub max_concurrent_reconciles: usize,
    pub enable_leader_election: bool,
    pub server_id: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Settings {
    /// Merge: CLI args (and their env fallbacks) > config file > defaults.
    pub fn resolve(cli: Cli, file: TunerConfigFile) -> anyhow::Result<Self> {
        let listen = cli
            .listen
            .or(file.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen: SocketAddr = listen
            .parse()
            .with_context(|| format!("invalid listen address '{}'", listen))?;

        let sync_period_secs = cli
            .sync_period_secs
            .or(file.sync_period_secs)
            .unwrap_or(DEFAULT_SYNC_PERIOD_SECS);
        if sync_period_secs == 0 {
            bail!("sync period must be at least one second");
        }
        let decision_timeout_secs = cli
            .decision_timeout_secs
            .or(file.decision_timeout_secs)
            .unwrap_or(DEFAULT_DECISION_TIMEOUT_SECS);
        if decision_timeout_secs == 0 {
            bail!("decision timeout must be at least one second");
        }

        let log_format = match cli.log_format {
            Some(format) => format,
            None => match file.log_format.as_deref() {
                None | Some("text") => LogFormat::Text,
                Some("json") => LogFormat::Json,
                Some(other) => bail!("unknown log format '{}' (expected text or json)", other),
            },
        };

        Ok(Self {
            listen,
            data_dir: cli
                .data_dir
                .or(file.data_dir)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            decision_service_endpoint: cli
                .decision_service_endpoint
                .or(file.decision_service_endpoint)
                .filter(|e| !e.trim().is_empty()),
            decision_timeout: Duration::from_secs(decision_timeout_secs),
            sync_period: Duration::from_secs(sync_period_secs),
            max_concurrent_reconciles: cli
                .max_concurrent_reconciles
                .or(file.max_concurrent_reconciles)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_RECONCILES)
                .max(1),
            enable_leader_election: cli
                .enable_leader_election
                .or(file.enable_leader_election)
                .unwrap_or(false),
            server_id: cli
                .server_id
                .or(file.server_id)
                .unwrap_or_else(|| format!("hpa-tuner-{}", uuid::Uuid::new_v4())),
            log_level: cli
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["hpa-tuner"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let s = Settings::resolve(cli(&[]), TunerConfigFile::default()).unwrap();
        assert_eq!(s.listen.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(s.sync_period, Duration::from_secs(DEFAULT_SYNC_PERIOD_SECS));
        assert_eq!(
            s.decision_timeout,
            Duration::from_secs(DEFAULT_DECISION_TIMEOUT_SECS)
        );
        assert!(!s.enable_leader_election);
        assert!(s.server_id.starts_with("hpa-tuner-"));
        assert_eq!(s.log_format, LogFormat::Text);
    }

    #[test]
    fn cli_overrides_file() {
        let file = TunerConfigFile {
            data_dir: Some("/var/lib/from-file".to_string()),
            sync_period_secs: Some(30),
            log_format: Some("json".to_string()),
            ..Default::default()
        };
        let s = Settings::resolve(
            cli(&["--sync-period-secs", "5", "--log-format", "text"]),
            file,
        )
        .unwrap();
        assert_eq!(s.sync_period, Duration::from_secs(5));
        assert_eq!(s.data_dir, "/var/lib/from-file");
        assert_eq!(s.log_format, LogFormat::Text);
    }

    #[test]
    fn blank_endpoint_disables_decision_service() {
        let file = TunerConfigFile {
            decision_service_endpoint: Some("  ".to_string()),
            ..Default::default()
        };
        let s = Settings::resolve(cli(&[]), file).unwrap();
        assert_eq!(s.decision_service_endpoint, None);
    }

    #[test]
    fn rejects_zero_sync_period_and_bad_listen_address() {
        assert!(Settings::resolve(cli(&["--sync-period-secs", "0"]), TunerConfigFile::default()).is_err());
        assert!(Settings::resolve(cli(&["--listen", "nowhere"]), TunerConfigFile::default()).is_err());
    }
}
