//! `KnowledgeGraph`: the entity store plus every derived-result cache.
//!
//! Mutations go through `&mut self` and invalidate the caches they can
//! affect before returning. Analytics take `&self`; memoized results live
//! behind an internal mutex so they can be filled from a shared borrow
//! (the engine runs them under a read lock on a blocking thread).

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use super::cache::{GraphCaches, PathKey};
use super::community;
use super::error::GraphError;
use super::influence::propagate;
use super::layout::{compute_layout, GraphVisualization, LayoutKind, Viewport, VisualEdge, VisualNode};
use super::models::{
    AnalyticsConfig, CentralNode, Community, Edge, GraphMetrics, GraphPath, GraphQuery,
    InfluenceScore, Node, NodeDegree, NodeType, PathKind, QueryResult,
};
use super::paths::find_path;
use super::query;
use super::ranking;
use super::store::EntityStore;
use crate::snapshot::Snapshot;

/// Outcome of replaying a snapshot through ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub nodes: usize,
    pub edges: usize,
    /// Records that failed validation and were skipped
    pub rejected: usize,
}

/// Current cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub paths: usize,
    pub influence: usize,
    pub communities: usize,
    pub page_rank: bool,
}

pub struct KnowledgeGraph {
    store: EntityStore,
    caches: Mutex<GraphCaches>,
    config: AnalyticsConfig,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}

impl KnowledgeGraph {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            store: EntityStore::new(),
            caches: Mutex::new(GraphCaches::new(config.path_cache_capacity)),
            config,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Read-only view of the underlying store.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    fn caches(&self) -> MutexGuard<'_, GraphCaches> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn caches_mut(&mut self) -> &mut GraphCaches {
        self.caches.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Insert or merge a node. See [`EntityStore::add_node`].
    pub fn add_node(&mut self, node: Node) -> Result<bool, GraphError> {
        let id = node.id.clone();
        match self.store.add_node(node) {
            Ok(created) => {
                if created {
                    self.caches_mut().page_rank = None;
                }
                Ok(created)
            }
            Err(e) => {
                tracing::warn!("Rejected node {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Insert or merge an edge and drop cached paths through either endpoint.
    ///
    /// Cached influence scores are left alone; they are refreshed by
    /// maintenance or dropped when something is removed.
    pub fn add_edge(&mut self, edge: Edge) -> Result<bool, GraphError> {
        let (id, source, target) = (edge.id.clone(), edge.source.clone(), edge.target.clone());
        match self.store.add_edge(edge) {
            Ok(created) => {
                let caches = self.caches_mut();
                caches.paths.invalidate_node(&source);
                caches.paths.invalidate_node(&target);
                if created {
                    caches.page_rank = None;
                }
                Ok(created)
            }
            Err(e) => {
                tracing::warn!("Rejected edge {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Remove a node and every incident edge. Returns the removed node.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let (node, edges) = self.store.remove_node(id)?;

        let mut touched: HashSet<&str> = HashSet::from([node.id.as_str()]);
        for edge in &edges {
            touched.insert(edge.source.as_str());
            touched.insert(edge.target.as_str());
        }
        let caches = self.caches_mut();
        let mut dropped = 0;
        for node_id in touched {
            dropped += caches.paths.invalidate_node(node_id);
            dropped += caches.influence.invalidate_node(node_id);
        }
        caches.communities.drop_node(&node.id);
        caches.page_rank = None;

        tracing::debug!(
            "Removed node {} with {} edges, {} cached results dropped",
            node.id,
            edges.len(),
            dropped
        );
        Some(node)
    }

    pub fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let edge = self.store.remove_edge(id)?;
        let caches = self.caches_mut();
        for node_id in [&edge.source, &edge.target] {
            caches.paths.invalidate_node(node_id);
            caches.influence.invalidate_node(node_id);
        }
        caches.page_rank = None;
        Some(edge)
    }

    /// Drop every node, edge and cached result.
    pub fn clear(&mut self) {
        self.store.clear();
        self.caches_mut().clear();
    }

    /// Remove timestamped edges older than `cutoff` lighter than
    /// `min_weight`. Returns the removed edge ids.
    pub fn prune_stale_edges(&mut self, cutoff: DateTime<Utc>, min_weight: f64) -> Vec<String> {
        let stale = self.store.stale_edges(cutoff, min_weight);
        stale
            .into_iter()
            .filter(|id| self.remove_edge(id).is_some())
            .collect()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.store.get_node(id)
    }

    pub fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.store.get_nodes_by_type(node_type)
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.store.get_edge(id)
    }

    pub fn get_node_edges(&self, id: &str) -> Vec<&Edge> {
        self.store.get_node_edges(id)
    }

    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&Edge> {
        self.store.edges_between(source, target)
    }

    pub fn degree(&self, id: &str) -> NodeDegree {
        self.store.degree(id)
    }

    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.store.edge_count()
    }

    pub fn query(&self, query: &GraphQuery) -> QueryResult {
        query::run_query(&self.store, query)
    }

    pub fn traverse_bfs(&self, start: &str, max_depth: usize) -> Vec<Node> {
        query::traverse_bfs(&self.store, start, max_depth)
    }

    pub fn traverse_dfs(&self, start: &str, max_depth: usize) -> Vec<Node> {
        query::traverse_dfs(&self.store, start, max_depth)
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn find_shortest_path(&self, from: &str, to: &str) -> Option<GraphPath> {
        self.find_path_cancellable(from, to, PathKind::Shortest, &CancellationToken::new())
            .ok()
            .flatten()
    }

    pub fn find_strongest_path(&self, from: &str, to: &str) -> Option<GraphPath> {
        self.find_path_cancellable(from, to, PathKind::Strongest, &CancellationToken::new())
            .ok()
            .flatten()
    }

    /// Cached path search. Only found paths are cached.
    pub fn find_path_cancellable(
        &self,
        from: &str,
        to: &str,
        kind: PathKind,
        cancel: &CancellationToken,
    ) -> Result<Option<GraphPath>, GraphError> {
        let key = PathKey::new(kind, from, to);
        let hit = self.caches().paths.get(&key);
        if hit.is_some() {
            return Ok(hit);
        }

        let path = find_path(&self.store, from, to, kind, cancel)?;
        if let Some(path) = &path {
            self.caches().paths.insert(key, path.clone());
        }
        Ok(path)
    }

    // ========================================================================
    // Ranking
    // ========================================================================

    pub fn calculate_node_centrality(&self, id: &str) -> f64 {
        ranking::degree_centrality(&self.store, id)
    }

    pub fn calculate_betweenness_centrality(&self, id: &str) -> f64 {
        self.calculate_betweenness_cancellable(id, &CancellationToken::new())
            .unwrap_or(0.0)
    }

    /// Sampled betweenness estimate, reusing cached shortest paths.
    pub fn calculate_betweenness_cancellable(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<f64, GraphError> {
        let mut rng = match self.config.betweenness_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ranking::betweenness_centrality(
            &self.store,
            id,
            self.config.betweenness_sample_size,
            &mut rng,
            |from, to| self.find_path_cancellable(from, to, PathKind::Shortest, cancel),
            cancel,
        )
    }

    /// PageRank with the configured iterations and damping.
    pub fn calculate_page_rank(&self) -> HashMap<String, f64> {
        self.calculate_page_rank_with(
            self.config.pagerank_iterations,
            self.config.pagerank_damping,
            &CancellationToken::new(),
        )
        .unwrap_or_default()
    }

    /// PageRank, cached per (iterations, damping) until the next structural
    /// mutation.
    pub fn calculate_page_rank_with(
        &self,
        iterations: usize,
        damping: f64,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, f64>, GraphError> {
        let key = (iterations, damping.to_bits());
        if let Some((cached_key, ranks)) = self.caches().page_rank.as_ref() {
            if *cached_key == key {
                tracing::debug!("PageRank cache hit ({} nodes)", ranks.len());
                return Ok(ranks.clone());
            }
        }

        let ranks = ranking::pagerank(&self.store, iterations, damping, cancel)?;
        self.caches().page_rank = Some((key, ranks.clone()));
        Ok(ranks)
    }

    // ========================================================================
    // Influence
    // ========================================================================

    pub fn calculate_influence(&self, id: &str) -> InfluenceScore {
        self.calculate_influence_with_depth(id, self.config.influence_depth)
    }

    /// Decayed reachability from `id`, cached per seed and depth.
    pub fn calculate_influence_with_depth(&self, id: &str, depth: usize) -> InfluenceScore {
        if let Some(score) = self.caches().influence.get(id, depth) {
            tracing::debug!("Influence cache hit for {}", id);
            return score;
        }

        let propagation = propagate(&self.store, id, depth, self.config.influence_decay);
        if self.store.contains_node(id) {
            self.caches().influence.insert(
                propagation.score.clone(),
                depth,
                propagation.reached,
            );
        }
        propagation.score
    }

    /// Evict and recompute influence for `seeds`. Returns how many were
    /// recomputed.
    pub fn refresh_influence(
        &self,
        seeds: &[String],
        cancel: &CancellationToken,
    ) -> Result<usize, GraphError> {
        self.caches().influence.evict(seeds);
        let mut refreshed = 0;
        for seed in seeds {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            self.calculate_influence(seed);
            refreshed += 1;
        }
        Ok(refreshed)
    }

    // ========================================================================
    // Communities
    // ========================================================================

    pub fn detect_communities(&self) -> Vec<Community> {
        self.detect_communities_cancellable(&CancellationToken::new())
            .unwrap_or_default()
    }

    /// Partition the graph and replace the cached communities.
    pub fn detect_communities_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Community>, GraphError> {
        let communities =
            community::detect_communities(&self.store, self.config.community_max_passes, cancel)?;
        self.caches().communities.replace(communities.clone());
        Ok(communities)
    }

    pub fn get_community(&self, id: &str) -> Option<Community> {
        self.caches().communities.get(id).cloned()
    }

    pub fn get_node_community(&self, node_id: &str) -> Option<Community> {
        self.caches().communities.of_node(node_id).cloned()
    }

    /// Communities from the last detection run.
    pub fn communities(&self) -> Vec<Community> {
        self.caches().communities.all().to_vec()
    }

    // ========================================================================
    // Metrics and visualization
    // ========================================================================

    pub fn get_metrics(&self) -> GraphMetrics {
        self.get_metrics_cancellable(&CancellationToken::new())
            .unwrap_or_else(|_| self.basic_metrics(0.0, Vec::new()))
    }

    pub fn get_metrics_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<GraphMetrics, GraphError> {
        let clustering = ranking::global_clustering(&self.store, cancel)?;
        let ranks = self.calculate_page_rank_with(
            self.config.pagerank_iterations,
            self.config.pagerank_damping,
            cancel,
        )?;
        let central_nodes = ranking::top_ranked(&ranks, self.config.central_node_count)
            .into_iter()
            .map(|(node_id, centrality)| CentralNode {
                node_id,
                centrality,
            })
            .collect();
        Ok(self.basic_metrics(clustering, central_nodes))
    }

    fn basic_metrics(&self, clustering: f64, central_nodes: Vec<CentralNode>) -> GraphMetrics {
        let n = self.store.node_count();
        let e = self.store.edge_count();
        let max_edges = n * n.saturating_sub(1) / 2;
        let total_degree: usize = self.store.nodes().map(|node| self.store.degree(&node.id).total).sum();

        GraphMetrics {
            node_count: n,
            edge_count: e,
            density: if max_edges > 0 {
                e as f64 / max_edges as f64
            } else {
                0.0
            },
            average_degree: if n > 0 {
                total_degree as f64 / n as f64
            } else {
                0.0
            },
            clustering_coefficient: clustering,
            communities: self.communities(),
            central_nodes,
        }
    }

    pub fn generate_visualization(
        &self,
        query: Option<&GraphQuery>,
        layout: LayoutKind,
    ) -> Result<GraphVisualization, GraphError> {
        self.generate_visualization_cancellable(query, layout, &CancellationToken::new())
    }

    /// Lay out the query result (or the whole graph) and attach styling and
    /// the cached communities.
    pub fn generate_visualization_cancellable(
        &self,
        query: Option<&GraphQuery>,
        layout: LayoutKind,
        cancel: &CancellationToken,
    ) -> Result<GraphVisualization, GraphError> {
        let QueryResult { nodes, edges } = match query {
            Some(q) => self.query(q),
            None => QueryResult {
                nodes: self.store.nodes().cloned().collect(),
                edges: self.store.edges().cloned().collect(),
            },
        };

        let positions = compute_layout(layout, &nodes, &edges, &self.config.layout, cancel)?;
        let nodes = nodes
            .into_iter()
            .zip(positions)
            .map(|(node, at)| {
                let centrality = ranking::degree_centrality(&self.store, &node.id);
                VisualNode::styled(node, at, centrality)
            })
            .collect();

        Ok(GraphVisualization {
            layout,
            nodes,
            edges: edges.into_iter().map(VisualEdge::styled).collect(),
            clusters: self.communities(),
            viewport: Viewport::default(),
        })
    }

    // ========================================================================
    // Cache management and persistence
    // ========================================================================

    pub fn clear_path_cache(&self) {
        self.caches().paths.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        let caches = self.caches();
        CacheStats {
            paths: caches.paths.len(),
            influence: caches.influence.len(),
            communities: caches.communities.all().len(),
            page_rank: caches.page_rank.is_some(),
        }
    }

    /// Copy the current state into a [`Snapshot`].
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            nodes: self.store.nodes().cloned().collect(),
            edges: self.store.edges().cloned().collect(),
            communities: self.communities(),
            saved_at: Utc::now(),
        }
    }

    /// Replay a snapshot through ingestion, nodes first.
    ///
    /// Invalid records are skipped and counted. Saved communities are
    /// restored only when the graph was empty beforehand, since a merge
    /// makes the old partition meaningless.
    pub fn import_snapshot(&mut self, snapshot: Snapshot) -> ImportReport {
        let was_empty = self.store.node_count() == 0;
        let mut report = ImportReport::default();

        for node in snapshot.nodes {
            match self.add_node(node) {
                Ok(_) => report.nodes += 1,
                Err(_) => report.rejected += 1,
            }
        }
        for edge in snapshot.edges {
            match self.add_edge(edge) {
                Ok(_) => report.edges += 1,
                Err(_) => report.rejected += 1,
            }
        }

        if was_empty && !snapshot.communities.is_empty() {
            let store = &self.store;
            let communities = snapshot
                .communities
                .into_iter()
                .map(|mut c| {
                    c.nodes.retain(|id| store.contains_node(id));
                    c.size = c.nodes.len();
                    c
                })
                .filter(|c| c.size > 0)
                .collect();
            self.caches_mut().communities.replace(communities);
        }

        tracing::info!(
            "Imported snapshot: {} nodes, {} edges, {} rejected",
            report.nodes,
            report.edges,
            report.rejected
        );
        report
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::EdgeType;
    use chrono::{Duration, TimeZone};

    fn user(id: &str) -> Node {
        Node::new(id, NodeType::User, id)
    }

    /// a -> b -> c with a weak shortcut a -> c
    fn triangle() -> KnowledgeGraph {
        let mut kg = KnowledgeGraph::default();
        for id in ["a", "b", "c"] {
            kg.add_node(user(id)).unwrap();
        }
        kg.add_edge(Edge::new("ab", "a", "b", EdgeType::Follows, 1.0))
            .unwrap();
        kg.add_edge(Edge::new("bc", "b", "c", EdgeType::Follows, 1.0))
            .unwrap();
        kg.add_edge(Edge::new("ac", "a", "c", EdgeType::Follows, 0.1))
            .unwrap();
        kg
    }

    #[test]
    fn test_rejected_mutations_leave_graph_unchanged() {
        let mut kg = triangle();
        let err = kg
            .add_edge(Edge::new("bad", "a", "ghost", EdgeType::Follows, 1.0))
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingEndpoint { .. }));
        assert!(kg
            .add_edge(Edge::new("zero", "a", "b", EdgeType::Follows, 0.0))
            .is_err());
        assert!(kg.add_node(user("n").with_weight(-1.0)).is_err());
        assert_eq!(kg.edge_count(), 3);
        assert_eq!(kg.node_count(), 3);
    }

    #[test]
    fn test_path_cache_is_filled_and_invalidated_by_removal() {
        let mut kg = triangle();
        let path = kg.find_shortest_path("a", "c").unwrap();
        assert_eq!(path.nodes, vec!["a", "b", "c"]);
        assert_eq!(kg.cache_stats().paths, 1);

        kg.remove_node("b");
        assert_eq!(kg.cache_stats().paths, 0);
        let path = kg.find_shortest_path("a", "c").unwrap();
        assert_eq!(path.nodes, vec!["a", "c"]);
    }

    #[test]
    fn test_add_edge_invalidates_paths_at_endpoints() {
        let mut kg = triangle();
        kg.find_shortest_path("a", "c").unwrap();
        kg.find_strongest_path("a", "c").unwrap();
        assert_eq!(kg.cache_stats().paths, 2);

        kg.add_edge(Edge::new("ac", "a", "c", EdgeType::Follows, 5.0))
            .unwrap();
        assert_eq!(kg.cache_stats().paths, 0);
        assert_eq!(kg.find_shortest_path("a", "c").unwrap().nodes, vec!["a", "c"]);
    }

    #[test]
    fn test_unreachable_paths_are_not_cached() {
        let kg = triangle();
        assert!(kg.find_shortest_path("c", "a").is_none());
        assert_eq!(kg.cache_stats().paths, 0);
    }

    #[test]
    fn test_influence_cache_survives_additions_until_refresh() {
        let mut kg = triangle();
        let before = kg.calculate_influence("a");
        assert_eq!(before.reach, 3);

        kg.add_node(user("d")).unwrap();
        kg.add_edge(Edge::new("cd", "c", "d", EdgeType::Follows, 1.0))
            .unwrap();
        assert_eq!(kg.calculate_influence("a").reach, 3, "stale until refreshed");

        let refreshed = kg
            .refresh_influence(&["a".to_string()], &CancellationToken::new())
            .unwrap();
        assert_eq!(refreshed, 1);
        assert_eq!(kg.calculate_influence("a").reach, 4);
    }

    #[test]
    fn test_edge_removal_invalidates_influence_that_reached_it() {
        let mut kg = triangle();
        kg.calculate_influence("a");
        kg.calculate_influence("c");
        assert_eq!(kg.cache_stats().influence, 2);

        kg.remove_edge("bc");
        // Both seeds reached b or c.
        assert_eq!(kg.cache_stats().influence, 0);
    }

    #[test]
    fn test_unknown_seed_is_not_cached() {
        let kg = triangle();
        let score = kg.calculate_influence("ghost");
        assert_eq!(score.reach, 0);
        assert_eq!(kg.cache_stats().influence, 0);
    }

    #[test]
    fn test_page_rank_cached_until_structural_change() {
        let mut kg = triangle();
        let ranks = kg.calculate_page_rank();
        assert!((ranks.values().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(kg.cache_stats().page_rank);

        // Merging an existing edge is not structural.
        kg.add_edge(Edge::new("ab", "a", "b", EdgeType::Follows, 2.0))
            .unwrap();
        assert!(kg.cache_stats().page_rank);

        kg.add_node(user("d")).unwrap();
        assert!(!kg.cache_stats().page_rank);
        assert_eq!(kg.calculate_page_rank().len(), 4);
    }

    #[test]
    fn test_communities_cached_and_node_removal_drops_member() {
        let mut kg = triangle();
        let communities = kg.detect_communities();
        assert!(!communities.is_empty());
        let home = kg.get_node_community("b").unwrap();
        assert!(home.nodes.contains(&"b".to_string()));
        assert!(kg.get_community(&home.id).is_some());

        kg.remove_node("b");
        assert!(kg.get_node_community("b").is_none());
        let after = kg.get_community(&home.id).unwrap();
        assert!(!after.nodes.contains(&"b".to_string()));
    }

    #[test]
    fn test_metrics() {
        let kg = triangle();
        let metrics = kg.get_metrics();
        assert_eq!(metrics.node_count, 3);
        assert_eq!(metrics.edge_count, 3);
        assert!((metrics.density - 1.0).abs() < 1e-9);
        // a: out 2, b: in 1 out 1, c: in 2
        assert!((metrics.average_degree - 2.0).abs() < 1e-9);
        assert!((metrics.clustering_coefficient - 1.0).abs() < 1e-9);
        assert_eq!(metrics.central_nodes.len(), 3);
        assert_eq!(metrics.central_nodes[0].node_id, "c");
    }

    #[test]
    fn test_metrics_on_empty_graph() {
        let metrics = KnowledgeGraph::default().get_metrics();
        assert_eq!(metrics.node_count, 0);
        assert_eq!(metrics.density, 0.0);
        assert_eq!(metrics.average_degree, 0.0);
        assert!(metrics.central_nodes.is_empty());
    }

    #[test]
    fn test_visualization_styles_and_clusters() {
        let kg = triangle();
        kg.detect_communities();
        let vis = kg
            .generate_visualization(None, LayoutKind::Circular)
            .unwrap();
        assert_eq!(vis.layout, LayoutKind::Circular);
        assert_eq!(vis.nodes.len(), 3);
        assert_eq!(vis.edges.len(), 3);
        assert!(!vis.clusters.is_empty());
        assert_eq!(vis.viewport, Viewport::default());

        let a = vis.nodes.iter().find(|n| n.node.id == "a").unwrap();
        // Degree centrality of a is 2 / 2 = 1.
        assert!((a.size - 25.0).abs() < 1e-9);
        let weak = vis.edges.iter().find(|e| e.edge.id == "ac").unwrap();
        assert_eq!(weak.width, 1.0);
        assert!(weak.curved);
    }

    #[test]
    fn test_visualization_of_query_subset() {
        let kg = triangle();
        let query = GraphQuery {
            start_node: Some("a".into()),
            max_depth: Some(0),
            ..Default::default()
        };
        let vis = kg
            .generate_visualization(Some(&query), LayoutKind::Force)
            .unwrap();
        assert_eq!(vis.nodes.len(), 1);
    }

    #[test]
    fn test_prune_stale_edges() {
        let mut kg = triangle();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        kg.add_edge(
            Edge::new("old_weak", "c", "a", EdgeType::Likes, 0.2)
                .with_timestamp(now - Duration::days(60)),
        )
        .unwrap();
        kg.add_edge(
            Edge::new("old_strong", "c", "b", EdgeType::Likes, 0.9)
                .with_timestamp(now - Duration::days(60)),
        )
        .unwrap();
        kg.add_edge(
            Edge::new("new_weak", "b", "a", EdgeType::Likes, 0.2)
                .with_timestamp(now - Duration::days(1)),
        )
        .unwrap();

        let removed = kg.prune_stale_edges(now - Duration::days(30), 0.5);
        assert_eq!(removed, vec!["old_weak".to_string()]);
        assert!(kg.get_edge("old_weak").is_none());
        assert!(kg.get_edge("old_strong").is_some());
        assert!(kg.get_edge("new_weak").is_some());
    }

    #[test]
    fn test_snapshot_import_counts_rejections_and_restores_communities() {
        let kg = triangle();
        kg.detect_communities();
        let mut snapshot = kg.snapshot();
        snapshot
            .edges
            .push(Edge::new("dangling", "a", "ghost", EdgeType::Follows, 1.0));
        snapshot
            .nodes
            .push(user("bad").with_weight(f64::NAN));

        let mut restored = KnowledgeGraph::default();
        let report = restored.import_snapshot(snapshot);
        assert_eq!(
            report,
            ImportReport {
                nodes: 3,
                edges: 3,
                rejected: 2
            }
        );
        assert_eq!(restored.edge_count(), 3);
        assert_eq!(restored.communities().len(), kg.communities().len());
        assert!(restored.get_node_community("a").is_some());
    }

    #[test]
    fn test_import_into_populated_graph_skips_communities() {
        let source = triangle();
        source.detect_communities();
        let snapshot = source.snapshot();

        let mut target = KnowledgeGraph::default();
        target.add_node(user("z")).unwrap();
        target.import_snapshot(snapshot);
        assert_eq!(target.node_count(), 4);
        assert!(target.communities().is_empty());
    }

    #[test]
    fn test_betweenness_with_seeded_sampling() {
        let config = AnalyticsConfig {
            betweenness_seed: Some(7),
            ..Default::default()
        };
        let mut kg = KnowledgeGraph::new(config);
        for id in ["a", "b", "c"] {
            kg.add_node(user(id)).unwrap();
        }
        kg.add_edge(Edge::new("ab", "a", "b", EdgeType::Follows, 1.0))
            .unwrap();
        kg.add_edge(Edge::new("bc", "b", "c", EdgeType::Follows, 1.0))
            .unwrap();

        // Ordered pairs excluding b: (a,c) and (c,a); only a -> c passes b.
        assert!((kg.calculate_betweenness_centrality("b") - 1.0 / 6.0).abs() < 1e-9);
        assert_eq!(kg.calculate_betweenness_centrality("ghost"), 0.0);
        assert!(kg.cache_stats().paths > 0, "betweenness reuses the path cache");
    }

    #[test]
    fn test_cancelled_analytics() {
        let kg = triangle();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            kg.detect_communities_cancellable(&token),
            Err(GraphError::Cancelled)
        ));
        assert!(matches!(
            kg.get_metrics_cancellable(&token),
            Err(GraphError::Cancelled)
        ));
        assert!(kg.communities().is_empty(), "cancelled run leaves cache untouched");
    }

    #[test]
    fn test_clear() {
        let mut kg = triangle();
        kg.calculate_page_rank();
        kg.find_shortest_path("a", "c");
        kg.clear();
        assert_eq!(kg.node_count(), 0);
        assert_eq!(kg.cache_stats(), CacheStats::default());
    }
}
