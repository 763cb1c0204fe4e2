//! Entity store: the authoritative node/edge state.
//!
//! Wraps a `petgraph::StableDiGraph` so node and edge indices stay valid
//! across removals, with O(1) id lookups, a node-type index and a
//! day-bucketed temporal index of edge ids used by pruning.

use chrono::{DateTime, Utc};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::error::GraphError;
use super::models::{Edge, Node, NodeDegree, NodeType};

const SECONDS_PER_DAY: i64 = 86_400;

/// Day bucket used by the temporal index.
pub(crate) fn day_bucket(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(SECONDS_PER_DAY)
}

/// In-memory typed, weighted, directed graph.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    graph: StableDiGraph<Node, Edge>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<String, EdgeIndex>,
    type_index: HashMap<NodeType, BTreeSet<String>>,
    temporal_index: BTreeMap<i64, HashSet<String>>,
    // Slots are reused after removal, so indices alone do not give
    // insertion order.
    edge_seq: HashMap<EdgeIndex, u64>,
    next_edge_seq: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Insert a node, or merge into the existing node with the same id.
    ///
    /// Returns `Ok(true)` when the node was created. On merge the property
    /// maps are combined (new keys win), the larger weight and the newer
    /// timestamp are kept, and `Ok(false)` is returned. The existing type and
    /// label never change.
    pub fn add_node(&mut self, node: Node) -> Result<bool, GraphError> {
        node.validate()?;

        if let Some(&idx) = self.node_index.get(&node.id) {
            let Some(existing) = self.graph.node_weight_mut(idx) else {
                return Err(GraphError::NodeNotFound(node.id));
            };
            existing.properties.extend(node.properties);
            existing.weight = existing.weight.max(node.weight);
            existing.timestamp = existing.timestamp.max(node.timestamp);
            return Ok(false);
        }

        let id = node.id.clone();
        let node_type = node.node_type;
        let idx = self.graph.add_node(node);
        self.node_index.insert(id.clone(), idx);
        self.type_index.entry(node_type).or_default().insert(id);
        Ok(true)
    }

    /// Remove a node and every incident edge.
    ///
    /// Returns the removed node together with the edges that went with it.
    pub fn remove_node(&mut self, id: &str) -> Option<(Node, Vec<Edge>)> {
        let idx = *self.node_index.get(id)?;

        let incident: Vec<String> = self
            .incident_edge_indices(idx)
            .into_iter()
            .filter_map(|e| self.graph.edge_weight(e).map(|edge| edge.id.clone()))
            .collect();
        let removed_edges: Vec<Edge> = incident
            .iter()
            .filter_map(|edge_id| self.remove_edge(edge_id))
            .collect();

        let node = self.graph.remove_node(idx)?;
        self.node_index.remove(id);
        if let Some(ids) = self.type_index.get_mut(&node.node_type) {
            ids.remove(id);
        }
        Some((node, removed_edges))
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        let idx = self.node_index.get(id)?;
        self.graph.node_weight(*idx)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Nodes of a given type, ordered by id.
    pub fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.type_index
            .get(&node_type)
            .map(|ids| ids.iter().filter_map(|id| self.get_node(id)).collect())
            .unwrap_or_default()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_indices().filter_map(|i| self.graph.node_weight(i))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Insert an edge, or merge into the existing edge with the same id.
    ///
    /// Both endpoints must already exist. On merge the larger weight and
    /// strength are kept, properties are combined and a newer timestamp
    /// replaces the old one (re-bucketing the temporal index).
    pub fn add_edge(&mut self, edge: Edge) -> Result<bool, GraphError> {
        edge.validate()?;

        if let Some(&eidx) = self.edge_index.get(&edge.id) {
            let Some(existing) = self.graph.edge_weight_mut(eidx) else {
                return Err(GraphError::MissingEndpoint {
                    edge: edge.id.clone(),
                    missing: edge.source,
                });
            };
            let old_bucket = existing.timestamp.map(day_bucket);
            existing.weight = existing.weight.max(edge.weight);
            existing.strength = match (existing.strength, edge.strength) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            existing.properties.extend(edge.properties);
            existing.timestamp = existing.timestamp.max(edge.timestamp);
            let new_bucket = existing.timestamp.map(day_bucket);

            if old_bucket != new_bucket {
                if let Some(bucket) = old_bucket {
                    self.unindex_temporal(bucket, &edge.id);
                }
                if let Some(bucket) = new_bucket {
                    self.temporal_index.entry(bucket).or_default().insert(edge.id);
                }
            }
            return Ok(false);
        }

        let from = self.require_endpoint(&edge, &edge.source)?;
        let to = self.require_endpoint(&edge, &edge.target)?;

        let id = edge.id.clone();
        let bucket = edge.timestamp.map(day_bucket);
        let eidx = self.graph.add_edge(from, to, edge);
        self.edge_index.insert(id.clone(), eidx);
        self.edge_seq.insert(eidx, self.next_edge_seq);
        self.next_edge_seq += 1;
        if let Some(bucket) = bucket {
            self.temporal_index.entry(bucket).or_default().insert(id);
        }
        Ok(true)
    }

    fn require_endpoint(&self, edge: &Edge, node_id: &str) -> Result<NodeIndex, GraphError> {
        self.node_index
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::MissingEndpoint {
                edge: edge.id.clone(),
                missing: node_id.to_string(),
            })
    }

    pub fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let eidx = self.edge_index.remove(id)?;
        let edge = self.graph.remove_edge(eidx)?;
        self.edge_seq.remove(&eidx);
        if let Some(ts) = edge.timestamp {
            self.unindex_temporal(day_bucket(ts), id);
        }
        Some(edge)
    }

    fn unindex_temporal(&mut self, bucket: i64, edge_id: &str) {
        if let Some(ids) = self.temporal_index.get_mut(&bucket) {
            ids.remove(edge_id);
            if ids.is_empty() {
                self.temporal_index.remove(&bucket);
            }
        }
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        let eidx = self.edge_index.get(id)?;
        self.graph.edge_weight(*eidx)
    }

    /// Every edge touching a node, outgoing and incoming, without duplicates.
    pub fn get_node_edges(&self, id: &str) -> Vec<&Edge> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        self.incident_edge_indices(idx)
            .into_iter()
            .filter_map(|e| self.graph.edge_weight(e))
            .collect()
    }

    /// Edges directed from `source` to `target`.
    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&Edge> {
        let (Some(&from), Some(&to)) = (self.node_index.get(source), self.node_index.get(target))
        else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeIndex, &Edge)> = self
            .graph
            .edges_connecting(from, to)
            .map(|e| (e.id(), e.weight()))
            .collect();
        edges.sort_unstable_by_key(|(eidx, _)| self.insertion_seq(*eidx));
        edges.into_iter().map(|(_, edge)| edge).collect()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_indices().filter_map(|e| self.graph.edge_weight(e))
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Ids of timestamped edges older than `cutoff` whose weight is below
    /// `min_weight`. Edges without a timestamp are never stale.
    pub fn stale_edges(&self, cutoff: DateTime<Utc>, min_weight: f64) -> Vec<String> {
        self.temporal_index
            .range(..=day_bucket(cutoff))
            .flat_map(|(_, ids)| ids.iter())
            .filter(|id| {
                self.get_edge(id).is_some_and(|edge| {
                    edge.weight < min_weight && edge.timestamp.is_some_and(|ts| ts < cutoff)
                })
            })
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // ========================================================================
    // Adjacency (used by the algorithms)
    // ========================================================================

    pub(crate) fn graph(&self) -> &StableDiGraph<Node, Edge> {
        &self.graph
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_index.get(id).copied()
    }

    pub(crate) fn node_at(&self, idx: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(idx)
    }

    pub(crate) fn node_indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Distinct neighbors in one direction; parallel edges collapse to one
    /// reference. Ordered by node index for deterministic traversal.
    pub(crate) fn neighbors(&self, idx: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub(crate) fn out_neighbors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors(idx, Direction::Outgoing)
    }

    pub(crate) fn in_neighbors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors(idx, Direction::Incoming)
    }

    fn insertion_seq(&self, eidx: EdgeIndex) -> u64 {
        self.edge_seq.get(&eidx).copied().unwrap_or(u64::MAX)
    }

    /// One edge per out-neighbor, ordered by neighbor index. Among parallel
    /// edges the earliest inserted one is the only one traversed.
    pub(crate) fn first_out_edges(&self, idx: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        let mut first: BTreeMap<NodeIndex, EdgeIndex> = BTreeMap::new();
        for e in self.graph.edges_directed(idx, Direction::Outgoing) {
            let slot = first.entry(e.target()).or_insert(e.id());
            if self.insertion_seq(e.id()) < self.insertion_seq(*slot) {
                *slot = e.id();
            }
        }
        first.into_iter().collect()
    }

    pub(crate) fn degree_at(&self, idx: NodeIndex) -> NodeDegree {
        let in_degree = self.in_neighbors(idx).len();
        let out_degree = self.out_neighbors(idx).len();
        NodeDegree {
            in_degree,
            out_degree,
            total: in_degree + out_degree,
        }
    }

    /// Distinct-neighbor degree of a node; zero for unknown ids.
    pub fn degree(&self, id: &str) -> NodeDegree {
        self.index_of(id)
            .map(|idx| self.degree_at(idx))
            .unwrap_or_default()
    }

    fn incident_edge_indices(&self, idx: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }
}

// ============================================================================
// Tests
// ============================================================================
