//! Snapshot persistence for the knowledge graph.
//!
//! A snapshot is the full node and edge set plus the last community
//! partition, serialized as JSON. Storage is behind [`SnapshotStore`] so the
//! engine does not care where the bytes end up.

#[cfg(test)]
pub mod mock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::graph::models::{Community, Edge, Node};

/// Serialized graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub communities: Vec<Community>,
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Durable storage for [`Snapshot`]s.
///
/// Implementations must be `Send + Sync` so they can be shared across async
/// tasks behind an `Arc<dyn SnapshotStore>`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the latest snapshot, or `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<Snapshot>>;

    /// Persist a snapshot, replacing any previous one.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// JSON file on local disk.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse snapshot {}", self.path.display()))?;
        tracing::debug!(
            "Loaded snapshot from {} ({} nodes, {} edges)",
            self.path.display(),
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move snapshot into {}", self.path.display()))?;
        tracing::debug!(
            "Saved snapshot to {} ({} bytes)",
            self.path.display(),
            json.len()
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::{EdgeType, NodeType};

    fn sample() -> Snapshot {
        Snapshot {
            nodes: vec![
                Node::new("u1", NodeType::User, "Ana"),
                Node::new("ev", NodeType::Event, "Milonga"),
            ],
            edges: vec![Edge::new("e1", "u1", "ev", EdgeType::Attends, 0.9)],
            communities: Vec::new(),
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("graph.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested").join("graph.json"));
        store.save(&sample()).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.edges[0].id, "e1");
        assert!(!store.temp_path().exists(), "temp file should be renamed away");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = FileSnapshotStore::new(&path);
        assert!(store.load().await.is_err());
    }

    #[test]
    fn test_communities_default_when_absent() {
        let json = r#"{"nodes": [], "edges": [], "saved_at": "2024-03-01T00:00:00Z"}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.communities.is_empty());
        assert!(snapshot.is_empty());
    }
}
