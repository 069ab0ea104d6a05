//! `scythed`, the Scythe daemon.
//!
//! Binary entrypoint that wires storage, the repair runner and the HTTP API
//! into a running repair scheduler.
//!
//! # Usage
//!
//! ```text
//! scythed start                            # in-memory, 0.0.0.0:8080
//! scythed start -c scythe.toml             # start with a config file
//! scythed start -l 127.0.0.1:9090          # override the listen address
//! scythed start --memory                   # force the in-memory backend
//! scythed check-config -c scythe.toml      # validate a config file
//! scythed status                           # summarize the on-disk database
//! ```

mod config;
mod dry_run;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scythe_api::{ApiServer, ApiServerConfig, RunDefaults};
use scythe_repair::{RepairRunner, RunnerConfig};
use scythe_store::{FjallStore, MemoryStore, RepairStore};
use scythe_types::{SegmentState, StorageBackend};
use tracing::{error, info};

use config::CliConfig;
use dry_run::DryRunRepairer;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "scythed", version, about = "Scythe repair scheduling daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "SCYTHE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and its HTTP API.
    Start {
        /// Override the HTTP listen address (e.g. "127.0.0.1:9090").
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,

        /// Run fully in-memory (no disk persistence).
        #[arg(short, long)]
        memory: bool,
    },

    /// Validate the configuration and exit.
    CheckConfig,

    /// Summarize clusters and repair runs in the on-disk database.
    Status,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start {
            listen_addr,
            memory,
        } => {
            // CLI args override config file values.
            if let Some(addr) = listen_addr {
                config.server.listen_addr = addr;
            }
            if memory {
                config.storage.backend = "memory".to_string();
            }
            cmd_start(config).await
        }
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Status => cmd_status(&config),
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// scythed start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let backend = config.storage_backend()?;

    info!("starting scythed");
    info!(
        listen_addr = %config.server.listen_addr,
        backend = ?backend,
        data_dir = %config.storage.data_dir.display(),
        run_threads = config.repair.run_threads,
        segment_count = config.repair.segment_count,
        intensity = config.repair.intensity,
        "scheduler configuration"
    );

    let store: Arc<dyn RepairStore> = match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Database => Arc::new(open_database(&config)?),
    };

    let repairer = Arc::new(DryRunRepairer::new(Duration::from_millis(
        config.repair.dry_run_delay_ms,
    )));
    let runner = RepairRunner::new(
        store,
        repairer,
        RunnerConfig {
            run_threads: config.repair.run_threads,
            max_segment_failures: config.repair.max_segment_failures,
            max_segment_count: config.repair.max_segment_count,
            ..RunnerConfig::default()
        },
    );

    let resumed = runner
        .resume_running_runs()
        .context("failed to resume repair runs")?;
    if resumed > 0 {
        info!(resumed, "resumed repair runs left running");
    }

    let server = ApiServer::new(ApiServerConfig {
        runner,
        defaults: RunDefaults {
            segment_count: config.repair.segment_count,
            intensity: config.repair.intensity,
            snapshot_repair: config.repair.snapshot_repair,
        },
    });

    server
        .serve_with_shutdown(&config.server.listen_addr, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("scythed stopped");
    Ok(())
}

fn open_database(config: &CliConfig) -> Result<FjallStore> {
    std::fs::create_dir_all(&config.storage.data_dir)
        .context("failed to create data directory")?;
    let path = config.storage.data_dir.join("db");
    FjallStore::open(&path).with_context(|| format!("failed to open database at {}", path.display()))
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested, draining connections");
}

// -----------------------------------------------------------------------
// scythed check-config
// -----------------------------------------------------------------------

fn cmd_check_config(config: &CliConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;
    println!("Configuration OK");
    println!("  listen_addr:  {}", config.server.listen_addr);
    println!("  backend:      {:?}", config.storage_backend()?);
    println!("  data_dir:     {}", config.storage.data_dir.display());
    println!("  run_threads:  {}", config.repair.run_threads);
    println!("  segments:     {}", config.repair.segment_count);
    println!("  intensity:    {}", config.repair.intensity);
    Ok(())
}

// -----------------------------------------------------------------------
// scythed status
// -----------------------------------------------------------------------

fn cmd_status(config: &CliConfig) -> Result<()> {
    let store = open_database(config).map_err(|e| {
        anyhow::anyhow!(
            "cannot open database in {}. Is scythed running? ({e:#})",
            config.storage.data_dir.display(),
        )
    })?;

    let clusters = store.get_clusters()?;
    println!("Clusters: {}", clusters.len());
    for cluster in &clusters {
        println!(
            "  {} partitioner={} tokens={}",
            cluster.name,
            cluster.partitioner,
            cluster.ring_tokens.len()
        );
        for run in store.get_repair_runs_for_cluster(&cluster.name)? {
            let total = store.get_repair_segments(run.id)?.len();
            let done = store.segments_amount(run.id, SegmentState::Done)?;
            println!(
                "    run {} state={:?} owner={} segments={done}/{total} last_event={:?}",
                run.id, run.state, run.owner, run.last_event,
            );
        }
    }

    Ok(())
}
