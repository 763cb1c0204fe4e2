//! Knowledge Graph Engine - command line
//!
//! Runs the engine with periodic maintenance, or answers one-off analytics
//! questions against the persisted snapshot.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use knowledge_graph_engine::engine::{GraphEngine, MaintenanceScheduler};
use knowledge_graph_engine::graph::{GraphQuery, LayoutKind};
use knowledge_graph_engine::snapshot::{FileSnapshotStore, Snapshot, SnapshotStore};
use knowledge_graph_engine::Config;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(about = "In-memory knowledge graph analytics")]
struct Cli {
    /// Path to the YAML config file (default: ./config.yaml)
    #[arg(long, global = true, env = "GRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the snapshot and run scheduled maintenance until Ctrl-C
    Run,

    /// Print graph metrics
    Stats,

    /// Find a path between two nodes
    Path {
        from: String,
        to: String,
        /// Maximize edge strength instead of minimizing distance
        #[arg(long)]
        strongest: bool,
    },

    /// Compute the influence score of a node
    Influence {
        node: String,
        /// Propagation depth (overrides config)
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Detect communities and print them
    Communities,

    /// Lay out the graph and print the visualization as JSON
    Visualize {
        /// force, hierarchical, circular or geographic
        #[arg(short, long, default_value = "force")]
        layout: LayoutKind,
        /// Restrict to the neighborhood of this node
        #[arg(long)]
        start: Option<String>,
        /// Hop limit around `--start`
        #[arg(long)]
        depth: Option<usize>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a snapshot file into the stored graph
    Import {
        /// JSON snapshot to import
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,knowledge_graph_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(&config.snapshot_path));
    let engine = Arc::new(
        GraphEngine::open(config.analytics.clone(), store, config.task_timeout()).await,
    );

    match cli.command {
        Commands::Run => run(engine, config).await,
        Commands::Stats => print_json(&engine.get_metrics().await?),
        Commands::Path {
            from,
            to,
            strongest,
        } => {
            let path = if strongest {
                engine.find_strongest_path(&from, &to).await?
            } else {
                engine.find_shortest_path(&from, &to).await?
            };
            match path {
                Some(path) => print_json(&path),
                None => {
                    eprintln!("No path from {} to {}", from, to);
                    Ok(())
                }
            }
        }
        Commands::Influence { node, depth } => {
            let score = match depth {
                Some(depth) => engine
                    .graph()
                    .read()
                    .await
                    .calculate_influence_with_depth(&node, depth),
                None => engine.calculate_influence(&node).await,
            };
            print_json(&score)
        }
        Commands::Communities => {
            let communities = engine.detect_communities().await?;
            engine.save_snapshot().await;
            print_json(&communities)
        }
        Commands::Visualize {
            layout,
            start,
            depth,
            output,
        } => {
            let query = start.map(|start| GraphQuery {
                start_node: Some(start),
                max_depth: depth,
                ..Default::default()
            });
            let visualization = engine.generate_visualization(query, layout).await?;
            match output {
                Some(path) => {
                    let json = serde_json::to_string_pretty(&visualization)?;
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!(
                        "Wrote {} nodes to {}",
                        visualization.nodes.len(),
                        path.display()
                    );
                    Ok(())
                }
                None => print_json(&visualization),
            }
        }
        Commands::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let report = engine.import_snapshot(snapshot).await;
            if !engine.save_snapshot().await {
                anyhow::bail!("Imported {} nodes but failed to save the snapshot", report.nodes);
            }
            print_json(&report)
        }
    }
}

async fn run(engine: Arc<GraphEngine>, config: Config) -> Result<()> {
    tracing::info!(
        "Graph engine running (snapshot: {}, maintenance every {}s)",
        config.snapshot_path.display(),
        config.maintenance.interval_secs
    );

    let scheduler = MaintenanceScheduler::start(engine.clone(), config.maintenance.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    scheduler.shutdown().await;
    engine.shutdown();
    if !engine.save_snapshot().await {
        tracing::warn!("Final snapshot was not saved");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
