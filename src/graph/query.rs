//! Query engine: filtered subgraph extraction and plain traversals.

use petgraph::stable_graph::NodeIndex;
use std::collections::{HashSet, VecDeque};

use super::models::{GraphQuery, Node, QueryResult};
use super::store::EntityStore;

/// Run a [`GraphQuery`].
///
/// With a start node this is a breadth-first walk over edges in both
/// directions. A node failing the type filter is neither returned nor
/// expanded; an edge failing the edge filters is skipped without stopping
/// the walk elsewhere. `max_depth` bounds the hop count from the start, and
/// nodes on that boundary contribute no edges leading past it.
/// Without a start node every node and edge is scanned. `limit` caps nodes
/// and edges separately.
pub fn run_query(store: &EntityStore, query: &GraphQuery) -> QueryResult {
    let mut result = match &query.start_node {
        Some(start) => bounded_walk(store, start, query),
        None => QueryResult {
            nodes: store
                .nodes()
                .filter(|n| query.accepts_node(n))
                .cloned()
                .collect(),
            edges: store
                .edges()
                .filter(|e| query.accepts_edge(e))
                .cloned()
                .collect(),
        },
    };

    if let Some(limit) = query.limit {
        result.nodes.truncate(limit);
        result.edges.truncate(limit);
    }
    result
}

fn bounded_walk(store: &EntityStore, start: &str, query: &GraphQuery) -> QueryResult {
    let mut result = QueryResult::default();
    let Some(start_idx) = store.index_of(start) else {
        return result;
    };

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut included: HashSet<NodeIndex> = HashSet::new();
    let mut seen_edges: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::from([(start_idx, 0usize)]);

    while let Some((idx, depth)) = queue.pop_front() {
        if query.max_depth.is_some_and(|max| depth > max) {
            continue;
        }
        if !visited.insert(idx) {
            continue;
        }
        let Some(node) = store.node_at(idx) else {
            continue;
        };
        if !query.accepts_node(node) {
            continue;
        }
        result.nodes.push(node.clone());
        included.insert(idx);
        let at_limit = query.max_depth.is_some_and(|max| depth >= max);

        for edge in store.get_node_edges(&node.id) {
            if !query.accepts_edge(edge) {
                continue;
            }
            let other = if edge.source == node.id {
                &edge.target
            } else {
                &edge.source
            };
            let Some(other_idx) = store.index_of(other) else {
                continue;
            };
            // On the boundary only edges back into the result are kept.
            if at_limit && !included.contains(&other_idx) {
                continue;
            }
            if seen_edges.insert(edge.id.clone()) {
                result.edges.push(edge.clone());
            }
            if !at_limit && !visited.contains(&other_idx) {
                queue.push_back((other_idx, depth + 1));
            }
        }
    }
    result
}

/// Breadth-first walk over outgoing edges, up to `max_depth` hops.
pub fn traverse_bfs(store: &EntityStore, start: &str, max_depth: usize) -> Vec<Node> {
    let Some(start_idx) = store.index_of(start) else {
        return Vec::new();
    };
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    let mut queue = VecDeque::from([(start_idx, 0usize)]);

    while let Some((idx, depth)) = queue.pop_front() {
        if depth > max_depth || !visited.insert(idx) {
            continue;
        }
        if let Some(node) = store.node_at(idx) {
            out.push(node.clone());
        }
        for next in store.out_neighbors(idx) {
            if !visited.contains(&next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    out
}

/// Depth-first pre-order walk over outgoing edges, up to `max_depth` hops.
pub fn traverse_dfs(store: &EntityStore, start: &str, max_depth: usize) -> Vec<Node> {
    let Some(start_idx) = store.index_of(start) else {
        return Vec::new();
    };
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![(start_idx, 0usize)];

    while let Some((idx, depth)) = stack.pop() {
        if depth > max_depth || !visited.insert(idx) {
            continue;
        }
        if let Some(node) = store.node_at(idx) {
            out.push(node.clone());
        }
        // Reverse so the first neighbor is explored first.
        for next in store.out_neighbors(idx).into_iter().rev() {
            if !visited.contains(&next) {
                stack.push((next, depth + 1));
            }
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
