//! trellisd: the trellis daemon.
//!
//! Single binary that drives the reconciler for every app instance in the
//! substrate store:
//!
//! - `apply`: load a desired-state instance from a TOML file
//! - `run`: reconcile all instances until shutdown
//! - `status`: dump instances, resources, and observed status as JSON
//! - `delete`: remove an instance and cascade-delete what it owns
//!
//! # Usage
//!
//! ```text
//! trellisd apply --file edu1.toml --data-dir /var/lib/trellis
//! trellisd run --data-dir /var/lib/trellis
//! ```

mod worker;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use trellis_reconcile::RetryPolicy;
use trellis_state::{AppInstance, SubstrateStore};

use crate::worker::WorkerSet;

#[derive(Parser)]
#[command(name = "trellisd", about = "Trellis daemon")]
struct Cli {
    /// Data directory for the substrate store.
    #[arg(long, default_value = "/var/lib/trellis", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile all app instances until shutdown.
    Run {
        /// Seconds between scans for new or removed instances.
        #[arg(long, default_value = "10")]
        resync_interval: u64,

        /// Give up on an instance after this many consecutive
        /// not-ready passes (default: retry forever).
        #[arg(long)]
        max_not_ready: Option<u32>,
    },
    /// Store a desired-state instance from a TOML file.
    Apply {
        /// Path to the instance definition.
        #[arg(long)]
        file: PathBuf,
    },
    /// Print instances, managed resources, and observed status as JSON.
    Status,
    /// Delete an instance and everything it owns.
    Delete {
        /// Instance key, `{namespace}/{name}`.
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trellisd=debug,trellis=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data dir {}", cli.data_dir.display()))?;
    let db_path = cli.data_dir.join("trellis.redb");
    let store = SubstrateStore::open(&db_path)
        .with_context(|| format!("opening substrate store at {}", db_path.display()))?;

    match cli.command {
        Command::Run {
            resync_interval,
            max_not_ready,
        } => run(store, resync_interval, max_not_ready).await,
        Command::Apply { file } => apply(&store, &file),
        Command::Status => status(&store),
        Command::Delete { key } => delete(&store, &key),
    }
}

async fn run(
    store: SubstrateStore,
    resync_interval: u64,
    max_not_ready: Option<u32>,
) -> anyhow::Result<()> {
    info!("trellis daemon starting");

    let policy = RetryPolicy { max_not_ready };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = WorkerSet::new(store.clone(), policy, shutdown_rx);

    let mut resync = tokio::time::interval(Duration::from_secs(resync_interval));
    loop {
        tokio::select! {
            _ = resync.tick() => {
                // A failed scan skips this tick rather than taking the
                // daemon down; the next tick retries.
                match scan_instance_keys(&store) {
                    Ok(keys) => workers.resync(keys).await,
                    Err(err) => warn!(error = %err, "instance scan failed, skipping resync"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    workers.stop_all();
    info!("trellis daemon stopped");
    Ok(())
}

fn scan_instance_keys(store: &SubstrateStore) -> anyhow::Result<Vec<String>> {
    Ok(store
        .list_instances()?
        .iter()
        .map(|i| i.table_key())
        .collect())
}

fn apply(store: &SubstrateStore, file: &PathBuf) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let instance: AppInstance =
        toml::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;

    anyhow::ensure!(
        instance.size >= 1,
        "instance size must be a positive replica count, got {}",
        instance.size
    );
    anyhow::ensure!(
        !instance.name.is_empty() && !instance.namespace.is_empty(),
        "instance name and namespace must be non-empty"
    );

    // Claims, bundles, and endpoints are named per tier, so a namespace
    // hosts at most one instance.
    if let Some(existing) = store
        .list_instances()?
        .into_iter()
        .find(|i| i.namespace == instance.namespace && i.name != instance.name)
    {
        anyhow::bail!(
            "namespace {} already hosts instance {}; one instance per namespace",
            instance.namespace,
            existing.name
        );
    }

    let key = instance.table_key();
    store.put_instance(&instance)?;
    info!(%key, size = instance.size, "instance stored");
    println!("{key}");
    Ok(())
}

fn status(store: &SubstrateStore) -> anyhow::Result<()> {
    let mut report = serde_json::Map::new();

    for instance in store.list_instances()? {
        let owned: Vec<serde_json::Value> = store
            .list_owned(&instance.uid())?
            .iter()
            .map(|desc| {
                serde_json::json!({
                    "kind": desc.kind,
                    "name": desc.name,
                    "workload_status": match desc.kind {
                        trellis_state::ResourceKind::Workload => store
                            .workload_status(&desc.namespace, &desc.name)
                            .ok()
                            .flatten()
                            .map(|s| s.ready_replicas),
                        _ => None,
                    },
                    "task_status": match desc.kind {
                        trellis_state::ResourceKind::Task => store
                            .task_status(&desc.namespace, &desc.name)
                            .ok()
                            .flatten()
                            .map(|s| s.succeeded),
                        _ => None,
                    },
                })
            })
            .collect();

        report.insert(
            instance.table_key(),
            serde_json::json!({
                "size": instance.size,
                "resources": owned,
            }),
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn delete(store: &SubstrateStore, key: &str) -> anyhow::Result<()> {
    let existed = store.delete_instance(key)?;
    if existed {
        info!(%key, "instance deleted with owned resources");
    } else {
        info!(%key, "instance not found, nothing deleted");
    }
    Ok(())
}
