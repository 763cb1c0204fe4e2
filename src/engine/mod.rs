//! Async handle around the knowledge graph.
//!
//! `GraphEngine` owns the graph behind a `tokio::sync::RwLock`: mutations
//! take the write lock, reads the read lock. Expensive analytics run on the
//! blocking pool with an owned read guard, a child cancellation token and a
//! timeout. Snapshot persistence is failure-isolated: a failed load starts
//! empty, a failed save is logged and leaves memory untouched.

pub mod maintenance;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::graph::{
    AnalyticsConfig, CacheStats, Community, Edge, GraphError, GraphMetrics, GraphPath,
    GraphQuery, GraphVisualization, ImportReport, InfluenceScore, KnowledgeGraph, LayoutKind,
    Node, NodeType, PathKind, QueryResult,
};
use crate::snapshot::{Snapshot, SnapshotStore};

pub use maintenance::{MaintenanceConfig, MaintenanceReport, MaintenanceScheduler};

pub struct GraphEngine {
    graph: Arc<RwLock<KnowledgeGraph>>,
    store: Arc<dyn SnapshotStore>,
    task_timeout: Duration,
    shutdown: CancellationToken,
}

impl GraphEngine {
    /// Build an engine and replay the stored snapshot, if any.
    ///
    /// A snapshot that cannot be read or parsed is logged and the engine
    /// starts with an empty graph.
    pub async fn open(
        config: AnalyticsConfig,
        store: Arc<dyn SnapshotStore>,
        task_timeout: Duration,
    ) -> Self {
        let mut graph = KnowledgeGraph::new(config);
        match store.load().await {
            Ok(Some(snapshot)) => {
                graph.import_snapshot(snapshot);
            }
            Ok(None) => tracing::info!("No snapshot found, starting with an empty graph"),
            Err(e) => tracing::warn!("Failed to load snapshot, starting empty: {:#}", e),
        }

        Self {
            graph: Arc::new(RwLock::new(graph)),
            store,
            task_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Shared graph handle for callers that need several reads under one lock.
    pub fn graph(&self) -> Arc<RwLock<KnowledgeGraph>> {
        self.graph.clone()
    }

    /// Token cancelled by [`GraphEngine::shutdown`]; background tasks derive
    /// child tokens from it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel all in-flight and future background work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run `f` on the blocking pool under a read lock.
    ///
    /// The closure receives a token that fires on timeout or engine
    /// shutdown.
    pub(crate) async fn run_blocking<T, F>(&self, f: F) -> Result<T, GraphError>
    where
        T: Send + 'static,
        F: FnOnce(&KnowledgeGraph, &CancellationToken) -> Result<T, GraphError> + Send + 'static,
    {
        let guard = self.graph.clone().read_owned().await;
        let cancel = self.shutdown.child_token();
        let task_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || f(&guard, &task_cancel));

        match tokio::time::timeout(self.task_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(GraphError::Task(e.to_string())),
            Err(_) => {
                cancel.cancel();
                tracing::warn!("Graph task timed out after {:?}", self.task_timeout);
                Err(GraphError::TimedOut(self.task_timeout))
            }
        }
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    pub async fn add_node(&self, node: Node) -> Result<bool, GraphError> {
        self.graph.write().await.add_node(node)
    }

    pub async fn add_edge(&self, edge: Edge) -> Result<bool, GraphError> {
        self.graph.write().await.add_edge(edge)
    }

    pub async fn remove_node(&self, id: &str) -> Option<Node> {
        self.graph.write().await.remove_node(id)
    }

    pub async fn remove_edge(&self, id: &str) -> Option<Edge> {
        self.graph.write().await.remove_edge(id)
    }

    pub async fn import_snapshot(&self, snapshot: Snapshot) -> ImportReport {
        self.graph.write().await.import_snapshot(snapshot)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_node(&self, id: &str) -> Option<Node> {
        self.graph.read().await.get_node(id).cloned()
    }

    pub async fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<Node> {
        self.graph
            .read()
            .await
            .get_nodes_by_type(node_type)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_edge(&self, id: &str) -> Option<Edge> {
        self.graph.read().await.get_edge(id).cloned()
    }

    pub async fn get_node_edges(&self, id: &str) -> Vec<Edge> {
        self.graph
            .read()
            .await
            .get_node_edges(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn query(&self, query: &GraphQuery) -> QueryResult {
        self.graph.read().await.query(query)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.graph.read().await.cache_stats()
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    pub async fn find_shortest_path(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<GraphPath>, GraphError> {
        self.find_path(from, to, PathKind::Shortest).await
    }

    pub async fn find_strongest_path(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<GraphPath>, GraphError> {
        self.find_path(from, to, PathKind::Strongest).await
    }

    async fn find_path(
        &self,
        from: &str,
        to: &str,
        kind: PathKind,
    ) -> Result<Option<GraphPath>, GraphError> {
        let (from, to) = (from.to_string(), to.to_string());
        self.run_blocking(move |graph, cancel| graph.find_path_cancellable(&from, &to, kind, cancel))
            .await
    }

    pub async fn calculate_node_centrality(&self, id: &str) -> f64 {
        self.graph.read().await.calculate_node_centrality(id)
    }

    pub async fn calculate_betweenness_centrality(&self, id: &str) -> Result<f64, GraphError> {
        let id = id.to_string();
        self.run_blocking(move |graph, cancel| graph.calculate_betweenness_cancellable(&id, cancel))
            .await
    }

    pub async fn calculate_page_rank(&self) -> Result<HashMap<String, f64>, GraphError> {
        self.run_blocking(|graph, cancel| {
            let config = graph.config();
            graph.calculate_page_rank_with(config.pagerank_iterations, config.pagerank_damping, cancel)
        })
        .await
    }

    pub async fn calculate_influence(&self, id: &str) -> InfluenceScore {
        self.graph.read().await.calculate_influence(id)
    }

    pub async fn detect_communities(&self) -> Result<Vec<Community>, GraphError> {
        self.run_blocking(|graph, cancel| graph.detect_communities_cancellable(cancel))
            .await
    }

    pub async fn get_community(&self, id: &str) -> Option<Community> {
        self.graph.read().await.get_community(id)
    }

    pub async fn get_node_community(&self, node_id: &str) -> Option<Community> {
        self.graph.read().await.get_node_community(node_id)
    }

    pub async fn get_metrics(&self) -> Result<GraphMetrics, GraphError> {
        self.run_blocking(|graph, cancel| graph.get_metrics_cancellable(cancel))
            .await
    }

    pub async fn generate_visualization(
        &self,
        query: Option<GraphQuery>,
        layout: LayoutKind,
    ) -> Result<GraphVisualization, GraphError> {
        self.run_blocking(move |graph, cancel| {
            graph.generate_visualization_cancellable(query.as_ref(), layout, cancel)
        })
        .await
    }

    // ========================================================================
    // Persistence and maintenance
    // ========================================================================

    /// Persist the current state. Returns `false` (after logging) on failure.
    pub async fn save_snapshot(&self) -> bool {
        let snapshot = self.graph.read().await.snapshot();
        match self.store.save(&snapshot).await {
            Ok(()) => {
                tracing::debug!(
                    "Snapshot saved ({} nodes, {} edges)",
                    snapshot.nodes.len(),
                    snapshot.edges.len()
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to save snapshot: {:#}", e);
                false
            }
        }
    }

    /// One maintenance cycle: communities, influence refresh for the top
    /// PageRank nodes, stale edge pruning, path cache reset, snapshot.
    pub async fn run_maintenance(
        &self,
        config: &MaintenanceConfig,
    ) -> Result<MaintenanceReport, GraphError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let cutoff = config.prune_cutoff(started_at)?;

        let communities = self.detect_communities().await?.len();

        let top_k = config.influence_top_k;
        let influence_refreshed = self
            .run_blocking(move |graph, cancel| {
                let settings = graph.config();
                let ranks = graph.calculate_page_rank_with(
                    settings.pagerank_iterations,
                    settings.pagerank_damping,
                    cancel,
                )?;
                let seeds: Vec<String> = crate::graph::ranking::top_ranked(&ranks, top_k)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                graph.refresh_influence(&seeds, cancel)
            })
            .await?;

        let pruned_edges = {
            let mut graph = self.graph.write().await;
            let pruned = graph.prune_stale_edges(cutoff, config.prune_min_weight);
            graph.clear_path_cache();
            pruned.len()
        };

        let snapshot_saved = self.save_snapshot().await;

        Ok(MaintenanceReport {
            run_id: Uuid::new_v4(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            communities,
            influence_refreshed,
            pruned_edges,
            snapshot_saved,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeType;
    use crate::snapshot::mock::MemorySnapshotStore;

    async fn open(store: Arc<MemorySnapshotStore>, timeout: Duration) -> GraphEngine {
        GraphEngine::open(AnalyticsConfig::default(), store, timeout).await
    }

    async fn populate(engine: &GraphEngine) {
        for id in ["a", "b", "c"] {
            engine
                .add_node(Node::new(id, NodeType::User, id))
                .await
                .unwrap();
        }
        engine
            .add_edge(Edge::new("ab", "a", "b", EdgeType::Follows, 1.0))
            .await
            .unwrap();
        engine
            .add_edge(Edge::new("bc", "b", "c", EdgeType::Follows, 1.0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_load_starts_empty() {
        let store = Arc::new(MemorySnapshotStore::failing());
        let engine = open(store, Duration::from_secs(5)).await;
        assert_eq!(engine.graph().read().await.node_count(), 0);
    }

    #[tokio::test]
    async fn test_open_replays_snapshot() {
        let source = KnowledgeGraph::default();
        let mut snapshot = source.snapshot();
        snapshot.nodes.push(Node::new("a", NodeType::User, "Ana"));
        let store = Arc::new(MemorySnapshotStore::with_snapshot(snapshot));

        let engine = open(store, Duration::from_secs(5)).await;
        assert_eq!(engine.get_node("a").await.map(|n| n.label), Some("Ana".into()));
    }

    #[tokio::test]
    async fn test_paths_and_metrics_on_blocking_pool() {
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = open(store, Duration::from_secs(5)).await;
        populate(&engine).await;

        let path = engine.find_shortest_path("a", "c").await.unwrap().unwrap();
        assert_eq!(path.nodes, vec!["a", "b", "c"]);
        assert!(engine.find_strongest_path("c", "a").await.unwrap().is_none());

        let metrics = engine.get_metrics().await.unwrap();
        assert_eq!(metrics.node_count, 3);
        assert_eq!(metrics.edge_count, 2);
    }

    #[tokio::test]
    async fn test_timeout_cancels_task() {
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = open(store, Duration::from_millis(50)).await;

        let result: Result<(), GraphError> = engine
            .run_blocking(|_, cancel| {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(GraphError::Cancelled)
            })
            .await;
        assert!(matches!(result, Err(GraphError::TimedOut(_))));
        assert!(!engine.is_shut_down(), "a timeout only cancels its own task");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_analytics() {
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = open(store, Duration::from_secs(5)).await;
        populate(&engine).await;

        engine.shutdown();
        assert!(matches!(
            engine.detect_communities().await,
            Err(GraphError::Cancelled)
        ));
        // Plain reads still work.
        assert!(engine.get_node("a").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_state() {
        let store = Arc::new(MemorySnapshotStore::failing());
        let engine = open(store, Duration::from_secs(5)).await;
        populate(&engine).await;

        assert!(!engine.save_snapshot().await);
        assert_eq!(engine.get_node_edges("b").await.len(), 2);
    }

    #[tokio::test]
    async fn test_maintenance_cycle() {
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = open(store.clone(), Duration::from_secs(5)).await;
        populate(&engine).await;
        engine
            .add_edge(
                Edge::new("stale", "c", "a", EdgeType::Likes, 0.1)
                    .with_timestamp(Utc::now() - chrono::Duration::days(45)),
            )
            .await
            .unwrap();
        engine.find_shortest_path("a", "c").await.unwrap();

        let report = engine
            .run_maintenance(&MaintenanceConfig::default())
            .await
            .unwrap();
        assert!(report.communities >= 1);
        assert_eq!(report.influence_refreshed, 3);
        assert_eq!(report.pruned_edges, 1);
        assert!(report.snapshot_saved);

        assert!(engine.get_edge("stale").await.is_none());
        let stats = engine.cache_stats().await;
        assert_eq!(stats.paths, 0);
        // Pruning c -> a invalidated every refreshed score that reached a or c.
        assert_eq!(stats.influence, 0);
        assert_eq!(store.save_count(), 1);
        let saved = store.current().await.unwrap();
        assert_eq!(saved.edges.len(), 2);
        assert!(!saved.communities.is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_rejects_out_of_range_age() {
        let store = Arc::new(MemorySnapshotStore::new());
        let engine = open(store.clone(), Duration::from_secs(5)).await;
        populate(&engine).await;

        let config = MaintenanceConfig {
            prune_after_days: i64::MAX,
            ..Default::default()
        };
        let err = engine.run_maintenance(&config).await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfig(_)));
        assert_eq!(store.save_count(), 0);
        assert!(engine.graph().read().await.communities().is_empty());
    }
}
