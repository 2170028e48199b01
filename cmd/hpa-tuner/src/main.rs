mod settings;

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pkg_api::AppState;
use pkg_api::server::start_server;
use pkg_controllers::{HpaTunerController, StoreEventRecorder, TunerContext};
use pkg_decision::DecisionSource;
use pkg_metrics::MetricsRegistry;
use pkg_state::client::StateStore;
use pkg_state::leader::LeaderElection;
use pkg_state::registry::Registry;
use pkg_types::config::{TunerConfigFile, load_config_file};

use settings::{Cli, LogFormat, Settings};

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let config_path = cli.config.clone();
    let file_cfg: TunerConfigFile = load_config_file(&config_path)?;
    let settings = Settings::resolve(cli, file_cfg)?;
    init_tracing(&settings.log_level, settings.log_format);

    info!("Starting hpa-tuner");
    info!("  Config file:      {}", config_path);
    info!("  Listen:           {}", settings.listen);
    info!("  Data dir:         {}", settings.data_dir);
    info!("  Sync period:      {}s", settings.sync_period.as_secs());
    info!("  Concurrency:      {}", settings.max_concurrent_reconciles);
    info!(
        "  Leader election:  {} ({})",
        settings.enable_leader_election, settings.server_id
    );

    let store = StateStore::new(&settings.data_dir).await?;
    let registry = Registry::new(store.clone());
    let metrics = Arc::new(MetricsRegistry::for_tuner());
    let decisions = DecisionSource::from_endpoint(
        settings.decision_service_endpoint.as_deref(),
        settings.decision_timeout,
    )?;

    let (election, leader) = if settings.enable_leader_election {
        let (handle, rx) = LeaderElection::new(store.clone(), settings.server_id.clone()).start();
        (Some(handle), rx)
    } else {
        (None, LeaderElection::always_leader())
    };

    let ctx = TunerContext {
        tuners: Arc::new(registry.clone()),
        autoscalers: Arc::new(registry.clone()),
        decisions,
        recorder: Arc::new(StoreEventRecorder::new(
            Arc::new(registry.clone()),
            metrics.clone(),
        )),
        metrics: metrics.clone(),
        sync_period: settings.sync_period,
    };
    let controller = HpaTunerController::new(ctx, leader)
        .with_watch(store.event_log.clone())
        .with_max_concurrent(settings.max_concurrent_reconciles)
        .start();

    let state = AppState {
        registry,
        metrics,
    };
    start_server(settings.listen, state, shutdown_signal()).await?;

    controller.abort();
    if let Some(handle) = election {
        handle.abort();
    }
    store.close().await?;
    info!("hpa-tuner stopped");
    Ok(())
}
