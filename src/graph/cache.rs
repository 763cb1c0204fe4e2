//! Memoized analytics results and their invalidation indexes.
//!
//! Every cache keeps a reverse index from node id to the entries that
//! reference it, so a mutation invalidates by direct lookup.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use super::models::{Community, GraphPath, InfluenceScore, PathKind};

// ============================================================================
// Path cache
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PathKey {
    pub kind: PathKind,
    pub from: String,
    pub to: String,
}

impl PathKey {
    pub fn new(kind: PathKind, from: &str, to: &str) -> Self {
        Self {
            kind,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Bounded LRU of path results, indexed by every node on each path.
#[derive(Debug)]
pub(crate) struct PathCache {
    entries: LruCache<PathKey, GraphPath>,
    by_node: HashMap<String, HashSet<PathKey>>,
}

impl PathCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            by_node: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &PathKey) -> Option<GraphPath> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: PathKey, path: GraphPath) {
        for node in &path.nodes {
            self.by_node
                .entry(node.clone())
                .or_default()
                .insert(key.clone());
        }
        if let Some((evicted_key, evicted)) = self.entries.push(key.clone(), path) {
            // `push` also returns the old value when the key was already present.
            if evicted_key != key {
                self.unindex(&evicted_key, &evicted);
            }
        }
    }

    fn unindex(&mut self, key: &PathKey, path: &GraphPath) {
        for node in &path.nodes {
            if let Some(keys) = self.by_node.get_mut(node) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_node.remove(node);
                }
            }
        }
    }

    /// Drop every cached path that visits `node_id`.
    pub fn invalidate_node(&mut self, node_id: &str) -> usize {
        let Some(keys) = self.by_node.remove(node_id) else {
            return 0;
        };
        let mut dropped = 0;
        for key in keys {
            if let Some(path) = self.entries.pop(&key) {
                self.unindex(&key, &path);
                dropped += 1;
            }
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_node.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Influence cache
// ============================================================================

#[derive(Debug, Clone)]
struct InfluenceEntry {
    depth: usize,
    score: InfluenceScore,
    reached: Vec<String>,
}

/// Influence scores keyed by seed, indexed by every node each seed reached.
#[derive(Debug, Default)]
pub(crate) struct InfluenceCache {
    entries: HashMap<String, InfluenceEntry>,
    reached_by: HashMap<String, HashSet<String>>,
}

impl InfluenceCache {
    pub fn get(&self, seed: &str, depth: usize) -> Option<InfluenceScore> {
        self.entries
            .get(seed)
            .filter(|entry| entry.depth == depth)
            .map(|entry| entry.score.clone())
    }

    pub fn insert(&mut self, score: InfluenceScore, depth: usize, reached: Vec<String>) {
        let seed = score.node_id.clone();
        self.remove_seed(&seed);
        for node in &reached {
            self.reached_by
                .entry(node.clone())
                .or_default()
                .insert(seed.clone());
        }
        self.entries.insert(
            seed,
            InfluenceEntry {
                depth,
                score,
                reached,
            },
        );
    }

    fn remove_seed(&mut self, seed: &str) {
        let Some(entry) = self.entries.remove(seed) else {
            return;
        };
        for node in &entry.reached {
            if let Some(seeds) = self.reached_by.get_mut(node) {
                seeds.remove(seed);
                if seeds.is_empty() {
                    self.reached_by.remove(node);
                }
            }
        }
    }

    /// Drop every score whose propagation reached `node_id`.
    pub fn invalidate_node(&mut self, node_id: &str) -> usize {
        let Some(seeds) = self.reached_by.remove(node_id) else {
            return 0;
        };
        let count = seeds.len();
        for seed in seeds {
            self.remove_seed(&seed);
        }
        count
    }

    pub fn evict(&mut self, seeds: &[String]) {
        for seed in seeds {
            self.remove_seed(seed);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.reached_by.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Community cache
// ============================================================================

/// Last community detection result with a direct node lookup.
#[derive(Debug, Default)]
pub(crate) struct CommunityCache {
    communities: Vec<Community>,
    by_node: HashMap<String, usize>,
}

impl CommunityCache {
    pub fn replace(&mut self, communities: Vec<Community>) {
        self.by_node = communities
            .iter()
            .enumerate()
            .flat_map(|(pos, c)| c.nodes.iter().map(move |n| (n.clone(), pos)))
            .collect();
        self.communities = communities;
    }

    pub fn all(&self) -> &[Community] {
        &self.communities
    }

    pub fn get(&self, id: &str) -> Option<&Community> {
        self.communities.iter().find(|c| c.id == id)
    }

    pub fn of_node(&self, node_id: &str) -> Option<&Community> {
        self.by_node
            .get(node_id)
            .and_then(|&pos| self.communities.get(pos))
    }

    /// Remove a deleted node from its cached community. Empty communities
    /// are kept until the next detection run so ids stay stable.
    pub fn drop_node(&mut self, node_id: &str) {
        let Some(pos) = self.by_node.remove(node_id) else {
            return;
        };
        if let Some(community) = self.communities.get_mut(pos) {
            community.nodes.retain(|n| n != node_id);
            community.size = community.nodes.len();
        }
    }

    pub fn clear(&mut self) {
        self.communities.clear();
        self.by_node.clear();
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// All derived results held by a `KnowledgeGraph`.
#[derive(Debug)]
pub(crate) struct GraphCaches {
    pub paths: PathCache,
    pub influence: InfluenceCache,
    pub communities: CommunityCache,
    /// PageRank keyed by (iterations, damping bits); dropped on any
    /// structural mutation.
    pub page_rank: Option<((usize, u64), HashMap<String, f64>)>,
}

impl GraphCaches {
    pub fn new(path_capacity: usize) -> Self {
        Self {
            paths: PathCache::new(path_capacity),
            influence: InfluenceCache::default(),
            communities: CommunityCache::default(),
            page_rank: None,
        }
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.influence.clear();
        self.communities.clear();
        self.page_rank = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::InfluenceFactors;

    fn path(nodes: &[&str]) -> GraphPath {
        GraphPath {
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
            edges: nodes.windows(2).map(|w| format!("{}{}", w[0], w[1])).collect(),
            weight: 1.0,
            kind: PathKind::Shortest,
        }
    }

    fn score(seed: &str) -> InfluenceScore {
        InfluenceScore {
            node_id: seed.to_string(),
            score: 1.0,
            reach: 1,
            impact: 1.0,
            factors: InfluenceFactors::default(),
        }
    }

    #[test]
    fn test_path_cache_invalidates_intermediate_nodes() {
        let mut cache = PathCache::new(16);
        let key = PathKey::new(PathKind::Shortest, "a", "c");
        cache.insert(key.clone(), path(&["a", "b", "c"]));
        cache.insert(
            PathKey::new(PathKind::Strongest, "x", "y"),
            path(&["x", "y"]),
        );

        assert_eq!(cache.invalidate_node("b"), 1);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_node("b"), 0);
    }

    #[test]
    fn test_path_cache_eviction_unindexes() {
        let mut cache = PathCache::new(1);
        cache.insert(PathKey::new(PathKind::Shortest, "a", "b"), path(&["a", "b"]));
        cache.insert(PathKey::new(PathKind::Shortest, "c", "d"), path(&["c", "d"]));
        assert_eq!(cache.len(), 1);
        assert!(!cache.by_node.contains_key("a"), "evicted path left an index entry");
        assert_eq!(cache.invalidate_node("c"), 1);
    }

    #[test]
    fn test_path_cache_reinsert_same_key_keeps_index() {
        let mut cache = PathCache::new(4);
        let key = PathKey::new(PathKind::Shortest, "a", "b");
        cache.insert(key.clone(), path(&["a", "b"]));
        cache.insert(key.clone(), path(&["a", "b"]));
        assert_eq!(cache.invalidate_node("a"), 1);
    }

    #[test]
    fn test_influence_cache_depth_and_reach_invalidation() {
        let mut cache = InfluenceCache::default();
        cache.insert(score("a"), 3, vec!["a".into(), "b".into()]);
        cache.insert(score("c"), 3, vec!["c".into()]);

        assert!(cache.get("a", 3).is_some());
        assert!(cache.get("a", 2).is_none(), "depth is part of the key");

        assert_eq!(cache.invalidate_node("b"), 1);
        assert!(cache.get("a", 3).is_none());
        assert!(cache.get("c", 3).is_some());
    }

    #[test]
    fn test_community_cache_drop_node() {
        let mut cache = CommunityCache::default();
        cache.replace(vec![Community {
            id: "community_0".into(),
            name: "user community".into(),
            nodes: vec!["a".into(), "b".into()],
            centrality: 0.5,
            density: 1.0,
            coherence: 1.0,
            leader: "a".into(),
            size: 2,
        }]);
        assert_eq!(cache.of_node("b").map(|c| c.id.as_str()), Some("community_0"));

        cache.drop_node("b");
        assert!(cache.of_node("b").is_none());
        assert_eq!(cache.get("community_0").map(|c| c.size), Some(1));
    }
}
