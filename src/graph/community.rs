//! Community detection by greedy local moves.
//!
//! Every node starts alone. Each pass visits the nodes in insertion order and
//! moves a node into the community of one of its out-neighbors when that
//! yields the best strictly positive gain
//!
//! ```text
//! gain = (Σ incident weight into target − Σ incident weight into current) / |E|
//! ```
//!
//! Incident weight counts edges in both directions. Passes stop when nothing
//! moves or the pass limit is reached.

use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use super::error::GraphError;
use super::models::{Community, NodeType};
use super::ranking::{degree_centrality_at, neighbor_jaccard};
use super::store::EntityStore;

const SAME_TYPE_SIMILARITY: f64 = 0.3;
const NEIGHBOR_SIMILARITY: f64 = 0.7;

/// Partition the graph and describe each community.
///
/// Communities are sorted by size (largest first) and numbered after
/// sorting, so `community_0` is always the largest.
pub fn detect_communities(
    store: &EntityStore,
    max_passes: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Community>, GraphError> {
    let indices = store.node_indices();
    let n = indices.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let position: HashMap<NodeIndex, usize> =
        indices.iter().enumerate().map(|(i, &idx)| (idx, i)).collect();

    // Incident edges (both directions) and distinct out-neighbor candidates.
    let mut incident: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for edge in store.graph().edge_references() {
        let (Some(&s), Some(&t)) = (position.get(&edge.source()), position.get(&edge.target()))
        else {
            continue;
        };
        let w = edge.weight().weight;
        incident[s].push((t, w));
        if s != t {
            incident[t].push((s, w));
        }
    }
    let candidates: Vec<Vec<usize>> = indices
        .iter()
        .map(|&idx| {
            store
                .out_neighbors(idx)
                .iter()
                .filter_map(|nb| position.get(nb).copied())
                .collect()
        })
        .collect();

    let total_edges = store.edge_count() as f64;
    let mut community: Vec<usize> = (0..n).collect();

    let mut passes = 0;
    let mut improved = total_edges > 0.0;
    while improved && passes < max_passes {
        improved = false;
        passes += 1;

        for node in 0..n {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            let current = community[node];

            let mut weight_to: HashMap<usize, f64> = HashMap::new();
            for &(other, w) in &incident[node] {
                *weight_to.entry(community[other]).or_default() += w;
            }
            let to_current = weight_to.get(&current).copied().unwrap_or(0.0);

            let mut best = current;
            let mut best_gain = 0.0;
            for &nb in &candidates[node] {
                let target = community[nb];
                if target == current {
                    continue;
                }
                let to_target = weight_to.get(&target).copied().unwrap_or(0.0);
                let gain = (to_target - to_current) / total_edges;
                if gain > best_gain {
                    best_gain = gain;
                    best = target;
                }
            }

            if best != current {
                community[node] = best;
                improved = true;
            }
        }
    }

    // Group by label, in order of first appearance.
    let mut order: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<NodeIndex>> = Vec::new();
    for (pos, &label) in community.iter().enumerate() {
        let slot = *order.entry(label).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(indices[pos]);
    }
    groups.sort_by_key(|members| std::cmp::Reverse(members.len()));

    tracing::debug!(
        "Community detection: {} nodes, {} communities after {} passes",
        n,
        groups.len(),
        passes
    );

    groups
        .into_iter()
        .enumerate()
        .map(|(i, members)| {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            Ok(describe(store, format!("community_{}", i), &members))
        })
        .collect()
}

fn describe(store: &EntityStore, id: String, members: &[NodeIndex]) -> Community {
    let size = members.len();
    let nodes: Vec<String> = members
        .iter()
        .filter_map(|&idx| store.node_at(idx).map(|n| n.id.clone()))
        .collect();

    let centrality = if size > 0 {
        members
            .iter()
            .map(|&idx| degree_centrality_at(store, idx))
            .sum::<f64>()
            / size as f64
    } else {
        0.0
    };

    let leader = members
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            store
                .degree_at(**a)
                .total
                .cmp(&store.degree_at(**b).total)
                .then_with(|| ib.cmp(ia))
        })
        .and_then(|(_, &idx)| store.node_at(idx))
        .map(|n| n.id.clone())
        .unwrap_or_default();

    Community {
        id,
        name: community_name(store, members),
        nodes,
        centrality,
        density: density(store, members),
        coherence: coherence(store, members),
        leader,
        size,
    }
}

/// `"<dominant type> community"`; ties go to the earlier type.
fn community_name(store: &EntityStore, members: &[NodeIndex]) -> String {
    let mut counts: HashMap<NodeType, usize> = HashMap::new();
    for &idx in members {
        if let Some(node) = store.node_at(idx) {
            *counts.entry(node.node_type).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then_with(|| tb.cmp(ta)))
        .map(|(t, _)| format!("{} community", t))
        .unwrap_or_else(|| "community".to_string())
}

/// Internal edges over possible member pairs; 1.0 for singletons.
fn density(store: &EntityStore, members: &[NodeIndex]) -> f64 {
    let n = members.len();
    if n <= 1 {
        return 1.0;
    }
    let g = store.graph();
    let internal: usize = members
        .iter()
        .map(|&a| {
            members
                .iter()
                .map(|&b| g.edges_connecting(a, b).count())
                .sum::<usize>()
        })
        .sum();
    internal as f64 / (n * (n - 1) / 2) as f64
}

/// Mean pairwise similarity: 0.3 for a shared type plus 0.7 × Jaccard of the
/// out-neighbor sets.
fn coherence(store: &EntityStore, members: &[NodeIndex]) -> f64 {
    let n = members.len();
    if n < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut comparisons = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (members[i], members[j]);
            let same_type = match (store.node_at(a), store.node_at(b)) {
                (Some(x), Some(y)) => x.node_type == y.node_type,
                _ => false,
            };
            if same_type {
                total += SAME_TYPE_SIMILARITY;
            }
            total += NEIGHBOR_SIMILARITY * neighbor_jaccard(store, a, b);
            comparisons += 1;
        }
    }
    total / comparisons as f64
}

// ============================================================================
// Tests
// ============================================================================
