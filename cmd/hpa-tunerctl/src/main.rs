mod client;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use pkg_constants::network::DEFAULT_API_ADDR;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::manifest::{Manifest, parse_manifests};
use pkg_types::tuner::HpaTuner;

use client::{ApiClient, Resource};

#[derive(Parser)]
#[command(name = "hpa-tunerctl", about = "CLI for managing hpa-tuner resources")]
struct Cli {
    /// Server API endpoint
    #[arg(long, default_value = DEFAULT_API_ADDR)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    #[value(alias = "tuners", alias = "hpatuner", alias = "hpatuners")]
    Tuner,
    #[value(alias = "hpas", alias = "horizontalpodautoscaler")]
    Hpa,
}

impl From<Kind> for Resource {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Tuner => Resource::Tuners,
            Kind::Hpa => Resource::Autoscalers,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update resources from a YAML manifest
    Apply {
        #[arg(short, long)]
        file: String,
        /// Namespace for documents that do not set one
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// List tuners or autoscalers, or show one by name
    Get {
        kind: Kind,
        name: Option<String>,
        /// Restrict to one namespace (all namespaces if omitted)
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Delete a tuner or autoscaler
    Delete {
        kind: Kind,
        name: String,
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Show recorded tuner events
    Events {
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
}

fn tuner_row(t: &HpaTuner) -> String {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "<none>".to_string())
    };
    format!(
        "{:<16} {:<24} {:<20} {:<5} {:<5} {:<8} {:<20} {}",
        t.namespace,
        t.name,
        t.spec.scale_target_ref.name,
        t.spec.min_replicas,
        t.spec.max_replicas,
        t.spec.use_decision_service,
        fmt_time(t.status.last_up_scale_time),
        fmt_time(t.status.last_down_scale_time)
    )
}

fn hpa_row(h: &HorizontalPodAutoscaler) -> String {
    let cpu = h
        .status
        .current_cpu_utilization_percent
        .map(|c| format!("{}%", c))
        .unwrap_or_else(|| "<unknown>".to_string());
    format!(
        "{:<16} {:<24} {:<5} {:<5} {:<8} {:<8} {}",
        h.namespace,
        h.name,
        h.spec.min_replicas,
        h.spec.max_replicas,
        h.status.current_replicas,
        h.status.desired_replicas,
        cpu
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server)?;

    match cli.command {
        Commands::Apply { file, namespace } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file))?;
            let manifests = parse_manifests(&content)?;
            if manifests.is_empty() {
                println!("(no resources in {})", file);
            }
            for mut manifest in manifests {
                manifest.default_namespace(&namespace);
                info!("Applying {} {}", manifest.kind(), manifest.name());
                match &manifest {
                    Manifest::HpaTuner(t) => {
                        let applied = client.apply_tuner(t).await?;
                        println!(
                            "hpatuner/{} applied (namespace={}, version={})",
                            applied.name, applied.namespace, applied.resource_version
                        );
                    }
                    Manifest::HorizontalPodAutoscaler(h) => {
                        let applied = client.apply_autoscaler(h).await?;
                        println!(
                            "horizontalpodautoscaler/{} applied (namespace={}, version={})",
                            applied.name, applied.namespace, applied.resource_version
                        );
                    }
                }
            }
        }
        Commands::Get {
            kind,
            name: Some(name),
            namespace,
        } => {
            let namespace = namespace.unwrap_or_else(|| "default".to_string());
            let body = match kind {
                Kind::Tuner => {
                    serde_json::to_string_pretty(&client.get_tuner(&namespace, &name).await?)?
                }
                Kind::Hpa => {
                    serde_json::to_string_pretty(&client.get_autoscaler(&namespace, &name).await?)?
                }
            };
            println!("{}", body);
        }
        Commands::Get {
            kind,
            name: None,
            namespace,
        } => match kind {
            Kind::Tuner => {
                let tuners = client.list_tuners(namespace.as_deref()).await?;
                println!(
                    "{:<16} {:<24} {:<20} {:<5} {:<5} {:<8} {:<20} {}",
                    "NAMESPACE", "NAME", "TARGET", "MIN", "MAX", "DECIDE", "LAST-UP", "LAST-DOWN"
                );
                for t in &tuners {
                    println!("{}", tuner_row(t));
                }
                if tuners.is_empty() {
                    println!("(no tuners found)");
                }
            }
            Kind::Hpa => {
                let hpas = client.list_autoscalers(namespace.as_deref()).await?;
                println!(
                    "{:<16} {:<24} {:<5} {:<5} {:<8} {:<8} {}",
                    "NAMESPACE", "NAME", "MIN", "MAX", "CURRENT", "DESIRED", "CPU"
                );
                for h in &hpas {
                    println!("{}", hpa_row(h));
                }
                if hpas.is_empty() {
                    println!("(no autoscalers found)");
                }
            }
        },
        Commands::Delete {
            kind,
            name,
            namespace,
        } => {
            let resource = Resource::from(kind);
            if client.delete(resource, &namespace, &name).await? {
                println!("{}/{} deleted", resource.path(), name);
            } else {
                eprintln!("Error: {}/{} not found in {}", resource.path(), name, namespace);
                std::process::exit(1);
            }
        }
        Commands::Events { namespace } => {
            let events = client.list_events(&namespace).await?;
            println!(
                "{:<20} {:<8} {:<24} {:<26} {:<6} {}",
                "TIME", "TYPE", "OBJECT", "REASON", "COUNT", "MESSAGE"
            );
            for e in &events {
                println!(
                    "{:<20} {:<8} {:<24} {:<26} {:<6} {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.event_type.to_string(),
                    e.involved_object.name,
                    e.reason,
                    e.count,
                    e.message
                );
            }
            if events.is_empty() {
                println!("(no events in {})", namespace);
            }
        }
    }

    Ok(())
}
