use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dht_cluster::cluster::config::ClusterConfig;
use dht_cluster::cluster::types::NodeId;
use dht_cluster::dht::DhtNode;
use dht_cluster::storage::MemoryStore;
use dht_cluster::transport::MeshTransport;
use dht_cluster::workload::{self, Script};

#[derive(Parser)]
#[command(name = "dht", about = "Hash-partitioned key/value store over a fixed node set")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run every node of the cluster inside this process.
    Local {
        #[arg(long, default_value_t = 4)]
        nodes: usize,
        /// Workload script; the built-in scenario runs when omitted.
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Run one node of a TCP cluster.
    Node {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        id: u32,
        #[arg(long)]
        script: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Local { nodes, script } => run_local(nodes, script).await,
        Mode::Node { config, id, script } => run_node(config, NodeId(id), script).await,
    }
}

fn load_script(path: Option<PathBuf>, node_count: usize) -> anyhow::Result<Script> {
    let script = match path {
        Some(path) => Script::from_file(&path.to_string_lossy())
            .with_context(|| format!("failed to load script {}", path.display()))?,
        None => Script::scenario(node_count),
    };
    script.check_targets(node_count)?;
    Ok(script)
}

async fn run_local(nodes: usize, script: Option<PathBuf>) -> anyhow::Result<()> {
    let script = Arc::new(load_script(script, nodes)?);
    let transports = MeshTransport::local_cluster(nodes)?;

    tracing::info!("Starting {} in-process nodes", nodes);

    let handles: Vec<_> = transports
        .into_iter()
        .map(|transport| {
            let script = script.clone();
            tokio::spawn(async move { session(Arc::new(transport), &script).await })
        })
        .collect();

    let mut dumps = Vec::with_capacity(handles.len());
    for handle in handles {
        dumps.push(handle.await??);
    }

    let mut stdout = std::io::stdout().lock();
    for (id, dump) in NodeId::all(nodes).zip(dumps) {
        writeln!(stdout, "== node {} ==", id)?;
        stdout.write_all(&dump)?;
    }
    Ok(())
}

async fn run_node(config: PathBuf, id: NodeId, script: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ClusterConfig::from_file(&config.to_string_lossy())
        .with_context(|| format!("failed to load cluster config {}", config.display()))?;
    let script = load_script(script, config.node_count())?;

    tracing::info!("Starting node {} of {}", id, config.node_count());
    let transport = MeshTransport::connect(&config, id).await?;

    let dump = session(Arc::new(transport), &script).await?;
    std::io::stdout().write_all(&dump)?;
    Ok(())
}

/// One node's whole lifetime: init, run its part of the script, destroy.
/// Returns the shard dump written on destroy.
async fn session(transport: Arc<MeshTransport>, script: &Script) -> anyhow::Result<Vec<u8>> {
    let node = DhtNode::init(transport, MemoryStore::init())?;

    for outcome in workload::run(&node, script).await? {
        println!("node {}: {}", node.id(), outcome);
    }

    let mut dump = Vec::new();
    node.destroy(&mut dump).await?;
    Ok(dump)
}
