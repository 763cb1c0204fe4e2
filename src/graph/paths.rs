//! Path finding over the entity store.
//!
//! Both objectives share one best-first search:
//! - **Shortest** minimizes the sum of `1 / weight` (Dijkstra)
//! - **Strongest** maximizes the product of edge strengths, stopping once no
//!   positive frontier remains
//!
//! Only strict improvements relax a node, and equal frontier keys pop in
//! insertion order, so the first minimal candidate found wins.

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use super::error::GraphError;
use super::models::{Edge, GraphPath, PathKind};
use super::store::EntityStore;

/// Heap entry; higher `score` pops first, then lower `seq`.
#[derive(Debug)]
struct Frontier {
    score: f64,
    seq: u64,
    node: NodeIndex,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PathKind {
    fn origin(self) -> f64 {
        match self {
            PathKind::Shortest => 0.0,
            PathKind::Strongest => 1.0,
        }
    }

    fn extend(self, acc: f64, edge: &Edge) -> f64 {
        match self {
            PathKind::Shortest => acc + edge.distance(),
            PathKind::Strongest => acc * edge.transmission(),
        }
    }

    fn improves(self, candidate: f64, current: f64) -> bool {
        match self {
            PathKind::Shortest => candidate < current,
            PathKind::Strongest => candidate > current,
        }
    }

    /// Heap priority; distances are negated so the max-heap pops the nearest.
    fn priority(self, value: f64) -> f64 {
        match self {
            PathKind::Shortest => -value,
            PathKind::Strongest => value,
        }
    }
}

/// Find the best path from `from` to `to` under `kind`.
///
/// Returns `Ok(None)` for unknown ids or when no route exists. A self path
/// is a single node with the objective's identity weight.
pub fn find_path(
    store: &EntityStore,
    from: &str,
    to: &str,
    kind: PathKind,
    cancel: &CancellationToken,
) -> Result<Option<GraphPath>, GraphError> {
    let (Some(source), Some(target)) = (store.index_of(from), store.index_of(to)) else {
        return Ok(None);
    };
    if source == target {
        return Ok(Some(GraphPath {
            nodes: vec![from.to_string()],
            edges: Vec::new(),
            weight: kind.origin(),
            kind,
        }));
    }

    let graph = store.graph();
    let mut best: HashMap<NodeIndex, f64> = HashMap::new();
    let mut predecessor: HashMap<NodeIndex, (NodeIndex, EdgeIndex)> = HashMap::new();
    let mut settled: HashSet<NodeIndex> = HashSet::new();
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;

    best.insert(source, kind.origin());
    heap.push(Frontier {
        score: kind.priority(kind.origin()),
        seq,
        node: source,
    });

    while let Some(Frontier { node, .. }) = heap.pop() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        if !settled.insert(node) {
            continue;
        }
        if node == target {
            break;
        }
        let acc = best.get(&node).copied().unwrap_or_else(|| kind.origin());
        if kind == PathKind::Strongest && acc <= 0.0 {
            break;
        }

        for (next, eidx) in store.first_out_edges(node) {
            if settled.contains(&next) {
                continue;
            }
            let Some(edge) = graph.edge_weight(eidx) else {
                continue;
            };
            let candidate = kind.extend(acc, edge);
            let improved = best
                .get(&next)
                .map_or(true, |&current| kind.improves(candidate, current));
            if improved {
                best.insert(next, candidate);
                predecessor.insert(next, (node, eidx));
                seq += 1;
                heap.push(Frontier {
                    score: kind.priority(candidate),
                    seq,
                    node: next,
                });
            }
        }
    }

    let Some(&weight) = best.get(&target) else {
        return Ok(None);
    };
    Ok(reconstruct(store, source, target, &predecessor).map(|(nodes, edges)| GraphPath {
        nodes,
        edges,
        weight,
        kind,
    }))
}

/// Walk the predecessor map back from `target`. Returns `None` unless the
/// walk ends at `source`.
fn reconstruct(
    store: &EntityStore,
    source: NodeIndex,
    target: NodeIndex,
    predecessor: &HashMap<NodeIndex, (NodeIndex, EdgeIndex)>,
) -> Option<(Vec<String>, Vec<String>)> {
    let graph = store.graph();
    let mut nodes = vec![store.node_at(target)?.id.clone()];
    let mut edges = Vec::new();
    let mut current = target;

    while let Some(&(prev, eidx)) = predecessor.get(&current) {
        edges.push(graph.edge_weight(eidx)?.id.clone());
        nodes.push(store.node_at(prev)?.id.clone());
        current = prev;
        if current == source {
            break;
        }
    }
    if current != source {
        return None;
    }

    nodes.reverse();
    edges.reverse();
    Some((nodes, edges))
}

// ============================================================================
// Tests
// ============================================================================
