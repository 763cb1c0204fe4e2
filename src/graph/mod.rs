//! In-memory knowledge graph and its analytics.
//!
//! A typed, weighted, directed graph over social entities, with path search,
//! ranking, community detection, influence propagation and layout. Derived
//! results are memoized and invalidated on the mutations that can change
//! them.
//!
//! ## Architecture
//!
//! ```text
//! ingestion ──► EntityStore (petgraph::StableDiGraph + indexes)
//!                    │                      │
//!                    │               cache invalidation
//!                    ▼                      ▼
//!   paths / ranking / community /      GraphCaches
//!   influence / query / layout  ◄──── (LRU paths, influence,
//!                    │                 PageRank, communities)
//!                    ▼
//!            KnowledgeGraph (facade)
//! ```
//!
//! ## Modules
//!
//! - [`models`] — Nodes, edges, derived results, queries, `AnalyticsConfig`
//! - [`store`] — `EntityStore`: authoritative state with type and temporal indexes
//! - [`cache`] — Memoized results with node → entry invalidation indexes
//! - [`paths`] — Shortest (`1/weight`) and strongest (strength product) paths
//! - [`ranking`] — Degree, sampled betweenness, PageRank, clustering
//! - [`community`] — Greedy local-move community detection
//! - [`influence`] — Decayed BFS influence scores
//! - [`query`] — Filtered subgraph queries and plain traversals
//! - [`layout`] — Force, hierarchical, circular and geographic layouts + styling
//! - [`knowledge`] — `KnowledgeGraph` facade tying it all together

pub mod cache;
pub mod community;
pub mod error;
pub mod influence;
pub mod knowledge;
pub mod layout;
pub mod models;
pub mod paths;
pub mod query;
pub mod ranking;
pub mod store;

// Re-export primary types for convenience
pub use error::GraphError;
pub use knowledge::{CacheStats, ImportReport, KnowledgeGraph};
pub use layout::{GraphVisualization, LayoutConfig, LayoutKind, Point, VisualEdge, VisualNode};
pub use models::{
    AnalyticsConfig, Community, Edge, EdgeType, GraphMetrics, GraphPath, GraphQuery,
    InfluenceScore, Node, NodeDegree, NodeType, PathKind, PropertyValue, QueryResult, TimeRange,
};
pub use store::EntityStore;
