//! Knowledge Graph Engine
//!
//! An in-memory social knowledge graph with:
//! - Typed, weighted, directed entities backed by petgraph
//! - Shortest/strongest paths, centrality, PageRank and communities
//! - Influence propagation and layouts for visualization
//! - Cached results with structured invalidation
//! - Periodic background maintenance and snapshot persistence

pub mod engine;
pub mod graph;
pub mod snapshot;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::MaintenanceConfig;
use graph::AnalyticsConfig;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub snapshot: SnapshotYamlConfig,
    pub engine: EngineYamlConfig,
    pub analytics: AnalyticsConfig,
    pub maintenance: MaintenanceConfig,
}

/// Snapshot persistence section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotYamlConfig {
    pub path: String,
}

impl Default for SnapshotYamlConfig {
    fn default() -> Self {
        Self {
            path: "data/graph-snapshot.json".into(),
        }
    }
}

/// Background task section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineYamlConfig {
    /// Upper bound for one analytics task on the blocking pool
    pub task_timeout_secs: u64,
}

impl Default for EngineYamlConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: 30,
        }
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Application configuration (YAML + env overrides)
#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot_path: PathBuf,
    pub task_timeout_secs: u64,
    pub analytics: AnalyticsConfig,
    pub maintenance: MaintenanceConfig,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let mut maintenance = yaml.maintenance;
        maintenance.interval_secs = std::env::var("GRAPH_MAINTENANCE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(maintenance.interval_secs);

        Ok(Self {
            snapshot_path: std::env::var("GRAPH_SNAPSHOT_PATH")
                .unwrap_or(yaml.snapshot.path)
                .into(),
            task_timeout_secs: std::env::var("GRAPH_TASK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.engine.task_timeout_secs),
            analytics: yaml.analytics,
            maintenance,
        })
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs.max(1))
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
