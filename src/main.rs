//! KratOs Node Registry Service
//!
//! Keeps health records for the peers seen by network discovery and hands
//! out bootstrap sets of live nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  KRATOS NODE REGISTRY                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Seed Probe              ←── Configured nodes, once at start│
//! │  Health Scheduler        ←── Re-probes oldest checks (30s)  │
//! │  Worker Pool             ←── Bounded concurrent probes      │
//! │  Node Registry           ←── Confirm / fail transitions     │
//! │  Node Store (RocksDB)    ←── Records + last-check index     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use kratos_node_registry::config::{RegistryConfig, StoreBackend};
use kratos_node_registry::metrics::Metrics;
use kratos_node_registry::prober::TcpProber;
use kratos_node_registry::registry::{NodeRegistry, ScoringPolicy};
use kratos_node_registry::scheduler::{HealthScheduler, SchedulerConfig};
use kratos_node_registry::store::{MemoryNodeStore, NodeStore, RocksNodeStore};
use kratos_node_registry::types::{NodeId, NodeRecord};

/// KratOs Node Registry - peer health tracking for network discovery
#[derive(Parser, Debug)]
#[command(name = "kratos-node-registry")]
#[command(author = "KratOs Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Health registry for KratOs peer nodes", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "node-registry.toml")]
    config: PathBuf,

    /// Data directory for the node store
    #[arg(short, long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Storage backend (overrides the config file)
    #[arg(long, global = true, value_enum)]
    store: Option<StoreBackend>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "KRATOS_LOG")]
    log_level: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the health scheduler until interrupted
    Run(RunCmd),

    /// Print the current bootstrap set
    Bootstrap(BootstrapCmd),

    /// Show the record of one node
    Lookup(LookupCmd),

    /// Dump all records to a JSON file
    Export(ExportCmd),

    /// Load records from a JSON file
    Import(ImportCmd),
}

#[derive(Parser, Debug)]
struct RunCmd {
    /// Seconds between scheduler cycles
    #[arg(long)]
    check_interval: Option<u64>,

    /// Records probed per cycle
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum probes in flight
    #[arg(long)]
    max_concurrent_probes: Option<usize>,

    /// Skip the start-up probe of configured seed nodes
    #[arg(long)]
    no_seeds: bool,
}

#[derive(Parser, Debug)]
struct BootstrapCmd {
    /// Number of nodes (defaults to bootstrap_set_size)
    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Parser, Debug)]
struct LookupCmd {
    /// Node id (64 hex characters)
    id: NodeId,
}

#[derive(Parser, Debug)]
struct ExportCmd {
    /// Output file
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ImportCmd {
    /// Input file produced by `export`
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let config = load_config(&cli)?;
    let store = open_store(&config, &cli.data_dir)?;
    let registry = Arc::new(NodeRegistry::new(store, ScoringPolicy::from_config(&config)));

    match cli.command {
        Commands::Run(cmd) => run(config, registry, !cmd.no_seeds).await,
        Commands::Bootstrap(cmd) => {
            let limit = cmd.limit.unwrap_or(config.bootstrap_set_size);
            print_bootstrap(&registry, limit).await
        }
        Commands::Lookup(cmd) => print_lookup(&registry, &cmd.id).await,
        Commands::Export(cmd) => export_records(&registry, &cmd.file).await,
        Commands::Import(cmd) => import_records(&registry, &cmd.file).await,
    }
}

/// Config file, then CLI overrides, then validation
fn load_config(cli: &Cli) -> anyhow::Result<RegistryConfig> {
    let config = if cli.config.exists() {
        RegistryConfig::load(&cli.config)?
    } else {
        warn!("Config file {:?} not found, using defaults", cli.config);
        RegistryConfig::default()
    };

    let mut config = config.with_store(cli.store);
    if let Commands::Run(cmd) = &cli.command {
        config = config
            .with_check_interval(cmd.check_interval)
            .with_batch_size(cmd.batch_size)
            .with_max_concurrent_probes(cmd.max_concurrent_probes);
    }

    config.validate()?;
    Ok(config)
}

fn open_store(config: &RegistryConfig, data_dir: &Path) -> anyhow::Result<Arc<dyn NodeStore>> {
    match config.store {
        StoreBackend::Rocksdb => {
            std::fs::create_dir_all(data_dir)?;
            let store = RocksNodeStore::open(&data_dir.join("node_registry"))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, records are lost on exit");
            Ok(Arc::new(MemoryNodeStore::new()))
        }
    }
}

async fn run(config: RegistryConfig, registry: Arc<NodeRegistry>, probe_seeds: bool) -> anyhow::Result<()> {
    info!("🌐 KratOs Node Registry v{}", env!("CARGO_PKG_VERSION"));

    info!("⚙️  Configuration:");
    info!("   Store: {:?}", config.store);
    info!("   Check interval: {}s", config.check_interval_secs);
    info!("   Batch size: {}", config.batch_size);
    info!("   Max concurrent probes: {}", config.max_concurrent_probes);
    info!("   Probe timeout: {}s", config.probe_timeout_secs);
    info!("   Seed nodes: {}", config.seed_nodes.len());

    let seeds = if probe_seeds { config.seed_peers()? } else { Vec::new() };

    let metrics = Arc::new(Metrics::new());
    let scheduler = HealthScheduler::new(
        registry.clone(),
        Arc::new(TcpProber),
        SchedulerConfig::from_config(&config),
        metrics.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker = tokio::spawn(async move {
        if !seeds.is_empty() {
            let report = scheduler.probe_nodes(seeds, &shutdown_rx).await;
            info!(
                "🌱 Seed nodes: {} reachable ({} new), {} unreachable",
                report.confirmed, report.discovered, report.failed
            );
        }
        scheduler.run(shutdown_rx).await;
    });

    info!("✅ Node registry started");
    info!("   Press Ctrl+C to shutdown gracefully");

    let finished = tokio::select! {
        _ = shutdown_signal() => false,
        result = &mut worker => {
            error!("Health scheduler exited: {:?}", result);
            true
        }
    };

    // In-flight probes record their outcome before the scheduler returns
    shutdown_tx.send_replace(true);
    if !finished {
        worker.await?;
    }

    registry.flush().await?;
    info!("📦 Node store flushed to disk");
    info!("📊 Final metrics: {}", metrics.to_json());

    info!("👋 KratOs Node Registry shutting down");
    Ok(())
}

/// Wait for SIGTERM or Ctrl+C
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("🛑 Received Ctrl+C"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("🛑 Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn print_bootstrap(registry: &NodeRegistry, limit: usize) -> anyhow::Result<()> {
    let nodes = registry.bootstrap_set(limit).await?;
    if nodes.is_empty() {
        warn!("No live nodes known");
    }

    for node in nodes {
        println!("{}", node);
    }
    Ok(())
}

async fn print_lookup(registry: &NodeRegistry, id: &NodeId) -> anyhow::Result<()> {
    match registry.lookup(id).await {
        Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        Err(e) if e.is_not_found() => println!("unknown"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn export_records(registry: &NodeRegistry, file: &Path) -> anyhow::Result<()> {
    let records = registry.export().await?;
    let json = serde_json::to_string_pretty(&records)?;
    tokio::fs::write(file, json).await?;

    info!("💾 Exported {} node records to {:?}", records.len(), file);
    Ok(())
}

async fn import_records(registry: &NodeRegistry, file: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(file).await?;
    let records: Vec<NodeRecord> = serde_json::from_str(&content)?;

    let imported = registry.import(&records).await?;
    registry.flush().await?;

    info!("📥 Imported {} node records from {:?}", imported, file);
    Ok(())
}
