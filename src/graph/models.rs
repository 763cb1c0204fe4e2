//! Knowledge graph data models.
//!
//! Defines the complete type system for the engine:
//!
//! ## Entities (ingestion)
//! - [`NodeType`] / [`Node`] — social and content entities
//! - [`EdgeType`] / [`Edge`] — directed, weighted relationships
//! - [`PropertyValue`] — open, tagged property values attached to entities
//!
//! ## Derived results (caches)
//! - [`Community`] — output of community detection
//! - [`GraphPath`] — shortest / strongest path results
//! - [`InfluenceScore`] — decayed reachability scores
//! - [`GraphMetrics`] — global summary returned by `get_metrics`
//!
//! ## Queries
//! - [`GraphQuery`] / [`QueryResult`] — bounded subgraph extraction
//!
//! ## Configuration
//! - [`AnalyticsConfig`] — tuning parameters for the algorithms

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::GraphError;
use super::layout::LayoutConfig;

// ============================================================================
// Entity types
// ============================================================================

/// Type of entity stored as a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    User,
    Event,
    Location,
    Interest,
    Community,
    Content,
    Agent,
}

impl NodeType {
    /// Every node type, in declaration order.
    pub const ALL: [NodeType; 7] = [
        Self::User,
        Self::Event,
        Self::Location,
        Self::Interest,
        Self::Community,
        Self::Content,
        Self::Agent,
    ];
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Event => write!(f, "event"),
            Self::Location => write!(f, "location"),
            Self::Interest => write!(f, "interest"),
            Self::Community => write!(f, "community"),
            Self::Content => write!(f, "content"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Type of relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Follows,
    Attends,
    Likes,
    LocatedAt,
    InterestedIn,
    BelongsTo,
    CreatedBy,
    RelatedTo,
    InteractsWith,
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Follows => write!(f, "follows"),
            Self::Attends => write!(f, "attends"),
            Self::Likes => write!(f, "likes"),
            Self::LocatedAt => write!(f, "located_at"),
            Self::InterestedIn => write!(f, "interested_in"),
            Self::BelongsTo => write!(f, "belongs_to"),
            Self::CreatedBy => write!(f, "created_by"),
            Self::RelatedTo => write!(f, "related_to"),
            Self::InteractsWith => write!(f, "interacts_with"),
        }
    }
}

// ============================================================================
// Open property values
// ============================================================================

/// A property value attached to a node or edge.
///
/// Serialized untagged, so snapshots read as plain JSON
/// (`{"latitude": 48.85, "verified": true, "tags": ["tango"]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Property map with deterministic key order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A validated geographic position read from node properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// ============================================================================
// Nodes and edges
// ============================================================================

/// An entity in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: String,
    /// Entity type
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display label
    pub label: String,
    /// Type-specific attributes (coordinates, handles, tags, ...)
    #[serde(default)]
    pub properties: Properties,
    /// Importance / recency signal, never negative
    #[serde(default)]
    pub weight: f64,
    /// Last time the entity was touched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            properties: Properties::new(),
            weight: 1.0,
            timestamp: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Read `latitude` / `longitude` properties.
    ///
    /// Returns `None` unless both are numbers inside their valid ranges.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        let latitude = self.properties.get("latitude")?.as_f64()?;
        let longitude = self.properties.get("longitude")?.as_f64()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(GeoPoint {
            latitude,
            longitude,
        })
    }

    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(GraphError::InvalidWeight {
                id: self.id.clone(),
                value: self.weight,
                reason: "node weight must be a finite, non-negative number",
            });
        }
        Ok(())
    }
}

/// A directed relationship between two nodes.
///
/// `weight` is an importance signal (shortest-path cost is `1 / weight`).
/// `strength` is a transmission probability in (0, 1] used by strongest-path
/// search and influence propagation; when absent, `min(weight, 1)` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
    /// Relationship type
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Importance, strictly positive
    pub weight: f64,
    /// Transmission probability in (0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: EdgeType,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            edge_type,
            weight,
            strength: None,
            properties: Properties::new(),
            timestamp: None,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Traversal cost for shortest-path search.
    pub fn distance(&self) -> f64 {
        1.0 / self.weight
    }

    /// Multiplicative factor for strongest-path search and influence.
    pub fn transmission(&self) -> f64 {
        self.strength.unwrap_or(self.weight).min(1.0)
    }

    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(GraphError::InvalidWeight {
                id: self.id.clone(),
                value: self.weight,
                reason: "edge weight must be a finite, positive number",
            });
        }
        if let Some(strength) = self.strength {
            if !strength.is_finite() || strength <= 0.0 || strength > 1.0 {
                return Err(GraphError::InvalidWeight {
                    id: self.id.clone(),
                    value: strength,
                    reason: "edge strength must lie in (0, 1]",
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Derived results
// ============================================================================

/// A cluster of nodes found by community detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    /// Community identifier (`community_<n>`, 0 = largest)
    pub id: String,
    /// Name derived from the dominant member type
    pub name: String,
    /// Member node IDs
    pub nodes: Vec<String>,
    /// Mean degree centrality of the members
    pub centrality: f64,
    /// Internal edges divided by possible member pairs
    pub density: f64,
    /// Mean pairwise member similarity (type + neighbor overlap)
    pub coherence: f64,
    /// Highest-degree member
    pub leader: String,
    /// Number of members
    pub size: usize,
}

/// Which objective produced a [`GraphPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// Minimum sum of `1 / weight`
    Shortest,
    /// Maximum product of edge strengths
    Strongest,
}

/// A path between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    /// Node IDs from source to target
    pub nodes: Vec<String>,
    /// Edge IDs, one per hop
    pub edges: Vec<String>,
    /// Total distance (shortest) or strength product (strongest)
    pub weight: f64,
    #[serde(rename = "type")]
    pub kind: PathKind,
}

impl GraphPath {
    /// Number of hops.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Influence contribution split by hop distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfluenceFactors {
    /// Seed contribution (level 0)
    pub direct: f64,
    /// Direct neighbors (level 1)
    pub indirect: f64,
    /// Everything further out (level >= 2)
    pub network: f64,
}

/// Decayed reachability score for a seed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceScore {
    pub node_id: String,
    pub score: f64,
    /// Number of distinct nodes reached, seed included
    pub reach: usize,
    /// Score per reached node
    pub impact: f64,
    pub factors: InfluenceFactors,
}

impl InfluenceScore {
    pub(crate) fn empty(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            score: 0.0,
            reach: 0,
            impact: 0.0,
            factors: InfluenceFactors::default(),
        }
    }
}

/// Distinct-neighbor degree of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDegree {
    pub in_degree: usize,
    pub out_degree: usize,
    pub total: usize,
}

/// A node ranked by PageRank in [`GraphMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralNode {
    pub node_id: String,
    pub centrality: f64,
}

/// Global summary of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub clustering_coefficient: f64,
    pub communities: Vec<Community>,
    pub central_nodes: Vec<CentralNode>,
}

// ============================================================================
// Queries
// ============================================================================

/// Inclusive timestamp window applied to edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Subgraph extraction request.
///
/// With `start_node`, a breadth-first traversal bounded by `max_depth`;
/// without, a scan of the whole graph. All filters are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQuery {
    pub start_node: Option<String>,
    pub node_types: Option<Vec<NodeType>>,
    pub edge_types: Option<Vec<EdgeType>>,
    pub max_depth: Option<usize>,
    pub min_weight: Option<f64>,
    pub time_range: Option<TimeRange>,
    pub limit: Option<usize>,
}

impl GraphQuery {
    pub(crate) fn accepts_node(&self, node: &Node) -> bool {
        self.node_types
            .as_ref()
            .map_or(true, |types| types.contains(&node.node_type))
    }

    pub(crate) fn accepts_edge(&self, edge: &Edge) -> bool {
        if let Some(types) = &self.edge_types {
            if !types.contains(&edge.edge_type) {
                return false;
            }
        }
        if let Some(min) = self.min_weight {
            if edge.weight < min {
                return false;
            }
        }
        match (&self.time_range, edge.timestamp) {
            (Some(range), Some(ts)) => range.contains(ts),
            _ => true,
        }
    }
}

/// Nodes and edges selected by a [`GraphQuery`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Tuning parameters for the graph algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// PageRank power iterations (default: 20)
    pub pagerank_iterations: usize,
    /// PageRank damping factor (default: 0.85)
    pub pagerank_damping: f64,
    /// Nodes sampled for betweenness estimation (default: 100)
    pub betweenness_sample_size: usize,
    /// Seed for betweenness sampling; random when unset
    pub betweenness_seed: Option<u64>,
    /// Community detection passes (default: 100)
    pub community_max_passes: usize,
    /// Influence BFS depth (default: 3)
    pub influence_depth: usize,
    /// Per-level influence decay (default: 0.5)
    pub influence_decay: f64,
    /// Maximum cached path results (default: 4096)
    pub path_cache_capacity: usize,
    /// Nodes reported in `GraphMetrics::central_nodes` (default: 10)
    pub central_node_count: usize,
    /// Layout parameters for visualization
    pub layout: LayoutConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            pagerank_iterations: 20,
            pagerank_damping: 0.85,
            betweenness_sample_size: 100,
            betweenness_seed: None,
            community_max_passes: 100,
            influence_depth: 3,
            influence_decay: 0.5,
            path_cache_capacity: 4096,
            central_node_count: 10,
            layout: LayoutConfig::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
