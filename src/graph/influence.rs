//! Influence propagation: decayed breadth-first reachability.

use std::collections::{HashSet, VecDeque};

use super::models::{InfluenceFactors, InfluenceScore};
use super::store::EntityStore;

/// Result of one propagation, with the nodes reached for cache indexing.
#[derive(Debug, Clone)]
pub(crate) struct Propagation {
    pub score: InfluenceScore,
    pub reached: Vec<String>,
}

/// Propagate influence from `seed` up to `depth` hops.
///
/// The seed carries weight 1. Each hop multiplies by the edge's transmission
/// strength, and a node first reached at level `l` contributes
/// `weight × decay^l`. Level 0 feeds `direct`, level 1 `indirect`, anything
/// further `network`. Unknown seeds yield a zero score with zero reach.
pub(crate) fn propagate(store: &EntityStore, seed: &str, depth: usize, decay: f64) -> Propagation {
    let Some(start) = store.index_of(seed) else {
        return Propagation {
            score: InfluenceScore::empty(seed),
            reached: Vec::new(),
        };
    };

    let graph = store.graph();
    let mut visited = HashSet::new();
    let mut reached = Vec::new();
    let mut queue = VecDeque::from([(start, 0usize, 1.0f64)]);
    let mut total = 0.0;
    let mut factors = InfluenceFactors::default();

    while let Some((node, level, weight)) = queue.pop_front() {
        if level > depth || !visited.insert(node) {
            continue;
        }
        if let Some(n) = store.node_at(node) {
            reached.push(n.id.clone());
        }

        let contribution = weight * decay.powi(level as i32);
        total += contribution;
        match level {
            0 => factors.direct += weight,
            1 => factors.indirect += contribution,
            _ => factors.network += contribution,
        }

        for (next, eidx) in store.first_out_edges(node) {
            if visited.contains(&next) {
                continue;
            }
            let strength = graph.edge_weight(eidx).map_or(0.0, |e| e.transmission());
            queue.push_back((next, level + 1, weight * strength));
        }
    }

    let reach = reached.len();
    Propagation {
        score: InfluenceScore {
            node_id: seed.to_string(),
            score: total,
            reach,
            impact: total / reach.max(1) as f64,
            factors,
        },
        reached,
    }
}

// ============================================================================
// Tests
// ============================================================================
