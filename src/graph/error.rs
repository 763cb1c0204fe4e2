//! Error taxonomy for graph mutations and long-running analytics.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the knowledge graph.
///
/// Read operations never fail for "no data" conditions (unknown ids, empty
/// graph, unreachable targets); only structurally invalid mutations and
/// interrupted background work produce an error.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The requested node does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// An edge references a source or target node that is not in the store.
    #[error("Edge {edge} references missing node {missing}")]
    MissingEndpoint { edge: String, missing: String },

    /// A node or edge carries a weight the algorithms cannot use.
    #[error("Invalid weight {value} on {id}: {reason}")]
    InvalidWeight {
        id: String,
        value: f64,
        reason: &'static str,
    },

    /// A configuration value is outside the range the engine can use.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cancellation token fired while the computation was running.
    #[error("Operation cancelled")]
    Cancelled,

    /// A background computation exceeded its time budget.
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(String),
}
