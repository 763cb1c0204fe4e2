//! Ranking engine: degree centrality, sampled betweenness, PageRank and
//! clustering coefficients.
//!
//! Adjacency is read through the store's distinct-neighbor view, so parallel
//! edges between the same ordered pair count once.

use petgraph::stable_graph::NodeIndex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use super::error::GraphError;
use super::models::GraphPath;
use super::store::EntityStore;

// ============================================================================
// Degree centrality
// ============================================================================

/// Normalized degree: `(in + out) / (|V| - 1)`; 0 for tiny graphs and
/// unknown ids.
pub fn degree_centrality(store: &EntityStore, node_id: &str) -> f64 {
    let Some(idx) = store.index_of(node_id) else {
        return 0.0;
    };
    degree_centrality_at(store, idx)
}

pub(crate) fn degree_centrality_at(store: &EntityStore, idx: NodeIndex) -> f64 {
    let n = store.node_count();
    if n <= 1 {
        return 0.0;
    }
    store.degree_at(idx).total as f64 / (n - 1) as f64
}

// ============================================================================
// Betweenness (sampled estimate)
// ============================================================================

/// Estimate betweenness of `node_id` from a node sample.
///
/// Draws up to `sample_size` nodes (all of them when the graph is small
/// enough), then counts ordered sample pairs, neither being the target, whose
/// shortest path visits the target. The count is normalized by the number of
/// ordered pairs in the sample. `shortest` is expected to serve from a cache.
pub fn betweenness_centrality<R, F>(
    store: &EntityStore,
    node_id: &str,
    sample_size: usize,
    rng: &mut R,
    mut shortest: F,
    cancel: &CancellationToken,
) -> Result<f64, GraphError>
where
    R: Rng + ?Sized,
    F: FnMut(&str, &str) -> Result<Option<GraphPath>, GraphError>,
{
    if !store.contains_node(node_id) {
        return Ok(0.0);
    }

    let ids: Vec<&str> = store.nodes().map(|n| n.id.as_str()).collect();
    let sample: Vec<&str> = if ids.len() <= sample_size {
        ids
    } else {
        ids.choose_multiple(rng, sample_size).copied().collect()
    };

    let k = sample.len();
    if k < 2 {
        return Ok(0.0);
    }

    let mut through = 0usize;
    for &source in &sample {
        if source == node_id {
            continue;
        }
        for &target in &sample {
            if target == source || target == node_id {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            if let Some(path) = shortest(source, target)? {
                if path.nodes.iter().any(|n| n == node_id) {
                    through += 1;
                }
            }
        }
    }

    Ok(through as f64 / (k * (k - 1)) as f64)
}

// ============================================================================
// PageRank (power iteration)
// ============================================================================

/// Compute PageRank for every node.
///
/// Starts at `1/n`; each round a node receives `(1 - d)/n` plus `d` times
/// the rank of each in-neighbor divided by that neighbor's distinct
/// out-degree. Rank held by nodes without out-neighbors is spread evenly so
/// the total stays 1. Ranks are replaced per round, never updated in place.
pub fn pagerank(
    store: &EntityStore,
    iterations: usize,
    damping: f64,
    cancel: &CancellationToken,
) -> Result<HashMap<String, f64>, GraphError> {
    let indices = store.node_indices();
    let n = indices.len();
    if n == 0 {
        return Ok(HashMap::new());
    }

    // Dense positions so the score vectors stay contiguous.
    let position: HashMap<NodeIndex, usize> =
        indices.iter().enumerate().map(|(i, &idx)| (idx, i)).collect();
    let out_links: Vec<Vec<usize>> = indices
        .iter()
        .map(|&idx| {
            store
                .out_neighbors(idx)
                .iter()
                .filter_map(|nb| position.get(nb).copied())
                .collect()
        })
        .collect();

    let initial = 1.0 / n as f64;
    let mut scores: Vec<f64> = vec![initial; n];
    let mut new_scores: Vec<f64> = vec![0.0; n];

    for _ in 0..iterations {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let dangling: f64 = out_links
            .iter()
            .zip(scores.iter())
            .filter(|(links, _)| links.is_empty())
            .map(|(_, s)| s)
            .sum();
        let base = (1.0 - damping) / n as f64 + damping * dangling / n as f64;
        for s in new_scores.iter_mut() {
            *s = base;
        }

        for (i, links) in out_links.iter().enumerate() {
            if links.is_empty() {
                continue;
            }
            let contribution = damping * scores[i] / links.len() as f64;
            for &j in links {
                new_scores[j] += contribution;
            }
        }

        std::mem::swap(&mut scores, &mut new_scores);
    }

    let mut result = HashMap::with_capacity(n);
    for (i, &idx) in indices.iter().enumerate() {
        if let Some(node) = store.node_at(idx) {
            result.insert(node.id.clone(), scores[i]);
        }
    }
    Ok(result)
}

/// Highest-ranked ids first; ties ordered by id.
pub fn top_ranked(ranks: &HashMap<String, f64>, limit: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = ranks.iter().map(|(k, v)| (k.clone(), *v)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// Clustering coefficient
// ============================================================================

/// Fraction of out-neighbor pairs connected in either direction.
pub(crate) fn local_clustering(store: &EntityStore, idx: NodeIndex) -> f64 {
    let neighbors: Vec<NodeIndex> = store
        .out_neighbors(idx)
        .into_iter()
        .filter(|&nb| nb != idx)
        .collect();
    let k = neighbors.len();
    if k < 2 {
        return 0.0;
    }

    let g = store.graph();
    let mut triangles = 0usize;
    for i in 0..k {
        for j in (i + 1)..k {
            let (ni, nj) = (neighbors[i], neighbors[j]);
            if g.contains_edge(ni, nj) || g.contains_edge(nj, ni) {
                triangles += 1;
            }
        }
    }
    triangles as f64 / (k * (k - 1) / 2) as f64
}

/// Mean of the positive local coefficients; 0 when none are positive.
pub fn global_clustering(store: &EntityStore, cancel: &CancellationToken) -> Result<f64, GraphError> {
    let mut total = 0.0;
    let mut count = 0usize;
    for idx in store.node_indices() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let c = local_clustering(store, idx);
        if c > 0.0 {
            total += c;
            count += 1;
        }
    }
    Ok(if count > 0 { total / count as f64 } else { 0.0 })
}

/// Jaccard similarity of two out-neighbor sets.
pub(crate) fn neighbor_jaccard(store: &EntityStore, a: NodeIndex, b: NodeIndex) -> f64 {
    let na: HashSet<NodeIndex> = store.out_neighbors(a).into_iter().collect();
    let nb: HashSet<NodeIndex> = store.out_neighbors(b).into_iter().collect();
    let union = na.union(&nb).count();
    if union == 0 {
        return 0.0;
    }
    na.intersection(&nb).count() as f64 / union as f64
}

// ============================================================================
// Tests
// ============================================================================
