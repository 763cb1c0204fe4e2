//! Layout engine and visualization styling.
//!
//! Positions are computed in a viewport centered on the origin
//! (`x ∈ [-width/2, width/2]`, `y ∈ [-height/2, height/2]`). Styling
//! (colors, sizes, widths) exists only on the visualization wrapper types;
//! the entity models never carry presentation data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::f64::consts::PI;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use super::error::GraphError;
use super::models::{Community, Edge, EdgeType, Node, NodeType};

// ============================================================================
// Configuration
// ============================================================================

/// Layout algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    #[default]
    Force,
    Hierarchical,
    Circular,
    Geographic,
}

impl std::fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Force => write!(f, "force"),
            Self::Hierarchical => write!(f, "hierarchical"),
            Self::Circular => write!(f, "circular"),
            Self::Geographic => write!(f, "geographic"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown layout: {0}")]
pub struct UnknownLayout(String);

impl FromStr for LayoutKind {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "force" => Ok(Self::Force),
            "hierarchical" => Ok(Self::Hierarchical),
            "circular" => Ok(Self::Circular),
            "geographic" => Ok(Self::Geographic),
            _ => Err(UnknownLayout(s.to_string())),
        }
    }
}

/// Layout tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Viewport width (default: 800)
    pub width: f64,
    /// Viewport height (default: 600)
    pub height: f64,
    /// Force-directed iterations, always all run (default: 100)
    pub iterations: usize,
    /// Multiplier applied to net force before moving a node (default: 0.95)
    pub damping: f64,
    /// Scale of the spring attraction along edges (default: 0.1)
    pub attraction_scale: f64,
    /// Circular layout radius (default: 300)
    pub radius: f64,
    /// Vertical distance between hierarchy levels (default: 100)
    pub level_spacing: f64,
    /// Seed for initial and fallback positions; random when unset
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            iterations: 100,
            damping: 0.95,
            attraction_scale: 0.1,
            radius: 300.0,
            level_spacing: 100.0,
            seed: None,
        }
    }
}

impl LayoutConfig {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn half_extent(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    fn random_point(&self, rng: &mut StdRng) -> Point {
        let (hw, hh) = self.half_extent();
        Point {
            x: rng.gen::<f64>() * self.width - hw,
            y: rng.gen::<f64>() * self.height - hh,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

// ============================================================================
// Layout algorithms
// ============================================================================

/// Position `nodes` with the chosen algorithm. The result is parallel to
/// `nodes`; edges whose endpoints are not both in `nodes` are ignored.
pub fn compute_layout(
    kind: LayoutKind,
    nodes: &[Node],
    edges: &[Edge],
    config: &LayoutConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Point>, GraphError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    match kind {
        LayoutKind::Force => force_directed(nodes, edges, config, cancel),
        LayoutKind::Hierarchical => Ok(hierarchical(nodes, edges, config)),
        LayoutKind::Circular => Ok(circular(nodes.len(), config)),
        LayoutKind::Geographic => Ok(geographic(nodes, config)),
    }
}

/// Pairs of positions in `nodes` joined by an edge; parallel edges kept.
fn edge_pairs(nodes: &[Node], edges: &[Edge]) -> Vec<(usize, usize)> {
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    edges
        .iter()
        .filter_map(|e| Some((*position.get(e.source.as_str())?, *position.get(e.target.as_str())?)))
        .collect()
}

/// Spring-electrical layout: pairwise repulsion `k²/d`, attraction along
/// edges `d²/k`, with `k = sqrt(area / n)`. Every iteration moves each node
/// by its damped net force, clamped only by the viewport.
fn force_directed(
    nodes: &[Node],
    edges: &[Edge],
    config: &LayoutConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Point>, GraphError> {
    let n = nodes.len();
    let (hw, hh) = config.half_extent();
    let k = (config.width * config.height / n as f64).sqrt();
    let pairs = edge_pairs(nodes, edges);

    let mut rng = config.rng();
    let mut pos: Vec<Point> = (0..n).map(|_| config.random_point(&mut rng)).collect();
    let mut force = vec![Point::default(); n];

    for _ in 0..config.iterations {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        force.iter_mut().for_each(|f| *f = Point::default());

        for i in 0..n {
            for j in (i + 1)..n {
                let dx = pos[j].x - pos[i].x;
                let dy = pos[j].y - pos[i].y;
                let dist = dx.hypot(dy).max(1.0);
                let repulsion = k * k / dist;
                let (fx, fy) = (dx / dist * repulsion, dy / dist * repulsion);
                force[i].x -= fx;
                force[i].y -= fy;
                force[j].x += fx;
                force[j].y += fy;
            }
        }

        for &(s, t) in &pairs {
            if s == t {
                continue;
            }
            let dx = pos[t].x - pos[s].x;
            let dy = pos[t].y - pos[s].y;
            let dist = dx.hypot(dy).max(1.0);
            let attraction = dist * dist / k * config.attraction_scale;
            let (fx, fy) = (dx / dist * attraction, dy / dist * attraction);
            force[s].x += fx;
            force[s].y += fy;
            force[t].x -= fx;
            force[t].y -= fy;
        }

        for (p, f) in pos.iter_mut().zip(&force) {
            p.x = (p.x + f.x * config.damping).clamp(-hw, hw);
            p.y = (p.y + f.y * config.damping).clamp(-hh, hh);
        }
    }

    Ok(pos)
}

/// Levels by breadth-first search from nodes without incoming edges inside
/// the laid-out set; unreached nodes sit on level 0. Each level is spread
/// evenly across the width.
fn hierarchical(nodes: &[Node], edges: &[Edge], config: &LayoutConfig) -> Vec<Point> {
    let n = nodes.len();
    let (hw, hh) = config.half_extent();
    let pairs = edge_pairs(nodes, edges);

    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut has_incoming = vec![false; n];
    for &(s, t) in &pairs {
        if s != t {
            outgoing[s].push(t);
            has_incoming[t] = true;
        }
    }

    let mut level: Vec<Option<usize>> = vec![None; n];
    let mut queue: VecDeque<(usize, usize)> =
        (0..n).filter(|&i| !has_incoming[i]).map(|i| (i, 0)).collect();
    let mut visited = HashSet::new();
    while let Some((i, l)) = queue.pop_front() {
        if !visited.insert(i) {
            continue;
        }
        level[i] = Some(l);
        for &next in &outgoing[i] {
            if !visited.contains(&next) {
                queue.push_back((next, l + 1));
            }
        }
    }

    let mut rows: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, l) in level.iter().enumerate() {
        rows.entry(l.unwrap_or(0)).or_default().push(i);
    }

    let mut pos = vec![Point::default(); n];
    for (l, members) in rows {
        let spacing = config.width / (members.len() + 1) as f64;
        for (slot, &i) in members.iter().enumerate() {
            pos[i] = Point {
                x: -hw + spacing * (slot + 1) as f64,
                y: -hh + l as f64 * config.level_spacing,
            };
        }
    }
    pos
}

fn circular(n: usize, config: &LayoutConfig) -> Vec<Point> {
    let step = 2.0 * PI / n as f64;
    (0..n)
        .map(|i| {
            let angle = i as f64 * step;
            Point {
                x: config.radius * angle.cos(),
                y: config.radius * angle.sin(),
            }
        })
        .collect()
}

/// Equirectangular projection of validated coordinates; nodes without
/// coordinates get a random position.
fn geographic(nodes: &[Node], config: &LayoutConfig) -> Vec<Point> {
    let (hw, hh) = config.half_extent();
    let mut rng = config.rng();
    nodes
        .iter()
        .map(|node| match node.coordinates() {
            Some(geo) => Point {
                x: (geo.longitude + 180.0) * (config.width / 360.0) - hw,
                y: (90.0 - geo.latitude) * (config.height / 180.0) - hh,
            },
            None => config.random_point(&mut rng),
        })
        .collect()
}

// ============================================================================
// Visualization output
// ============================================================================

const NEUTRAL_GRAY: &str = "#9CA3AF";

pub fn node_color(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::User => "#5EEAD4",
        NodeType::Event => "#FB923C",
        NodeType::Location => "#A78BFA",
        NodeType::Interest => "#FDE047",
        NodeType::Community => "#86EFAC",
        NodeType::Content => "#93C5FD",
        NodeType::Agent => "#FCA5A5",
    }
}

pub fn edge_color(edge_type: EdgeType) -> &'static str {
    match edge_type {
        EdgeType::Follows => "#5EEAD4",
        EdgeType::Attends => "#FB923C",
        EdgeType::Likes => "#F472B6",
        EdgeType::LocatedAt => "#A78BFA",
        EdgeType::InterestedIn => "#FDE047",
        EdgeType::BelongsTo => "#86EFAC",
        EdgeType::CreatedBy => "#93C5FD",
        EdgeType::RelatedTo => NEUTRAL_GRAY,
        EdgeType::InteractsWith => "#FCA5A5",
    }
}

/// Node size grows with degree centrality.
pub fn node_size(centrality: f64) -> f64 {
    5.0 + centrality * 20.0
}

pub fn edge_width(weight: f64) -> f64 {
    (weight * 3.0).max(1.0)
}

/// A positioned, styled node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualNode {
    #[serde(flatten)]
    pub node: Node,
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub size: f64,
}

/// A styled edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualEdge {
    #[serde(flatten)]
    pub edge: Edge,
    pub color: String,
    pub width: f64,
    pub curved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Everything a renderer needs to draw the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphVisualization {
    pub layout: LayoutKind,
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
    pub clusters: Vec<Community>,
    pub viewport: Viewport,
}

impl VisualEdge {
    pub fn styled(edge: Edge) -> Self {
        Self {
            color: edge_color(edge.edge_type).to_string(),
            width: edge_width(edge.weight),
            curved: true,
            edge,
        }
    }
}

impl VisualNode {
    pub fn styled(node: Node, at: Point, centrality: f64) -> Self {
        Self {
            color: node_color(node.node_type).to_string(),
            size: node_size(centrality),
            x: at.x,
            y: at.y,
            node,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter()
            .map(|id| Node::new(*id, NodeType::User, *id))
            .collect()
    }

    fn edge(s: &str, t: &str) -> Edge {
        Edge::new(format!("{s}{t}"), s, t, EdgeType::Follows, 1.0)
    }

    fn seeded() -> LayoutConfig {
        LayoutConfig {
            seed: Some(11),
            ..Default::default()
        }
    }

    #[test]
    fn test_layout_kind_parse_and_display() {
        for kind in [
            LayoutKind::Force,
            LayoutKind::Hierarchical,
            LayoutKind::Circular,
            LayoutKind::Geographic,
        ] {
            assert_eq!(kind.to_string().parse::<LayoutKind>().unwrap(), kind);
        }
        assert_eq!("Circular".parse::<LayoutKind>().unwrap(), LayoutKind::Circular);
        assert!("spiral".parse::<LayoutKind>().is_err());
    }

    #[test]
    fn test_force_layout_stays_in_viewport_and_is_seeded() {
        let ns = nodes(&["a", "b", "c", "d", "e"]);
        let es = vec![edge("a", "b"), edge("b", "c"), edge("c", "a"), edge("d", "e")];
        let config = seeded();
        let token = CancellationToken::new();

        let first = compute_layout(LayoutKind::Force, &ns, &es, &config, &token).unwrap();
        let second = compute_layout(LayoutKind::Force, &ns, &es, &config, &token).unwrap();
        assert_eq!(first, second, "same seed, same layout");

        for p in &first {
            assert!(p.x.abs() <= 400.0 && p.y.abs() <= 300.0, "out of bounds: {:?}", p);
        }
    }

    #[test]
    fn test_force_layout_separates_nodes() {
        let ns = nodes(&["a", "b"]);
        let pos = compute_layout(
            LayoutKind::Force,
            &ns,
            &[],
            &seeded(),
            &CancellationToken::new(),
        )
        .unwrap();
        let dist = (pos[0].x - pos[1].x).hypot(pos[0].y - pos[1].y);
        assert!(dist > 50.0, "unconnected nodes should repel, got {}", dist);
    }

    #[test]
    fn test_force_step_moves_by_full_damped_force() {
        let config = LayoutConfig {
            width: 10_000.0,
            height: 10.0,
            iterations: 1,
            damping: 1.0,
            seed: Some(3),
            ..Default::default()
        };
        let mut rng = config.rng();
        let a = config.random_point(&mut rng);
        let b = config.random_point(&mut rng);

        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let dist = dx.hypot(dy).max(1.0);
        let push = config.width * config.height / 2.0 / dist;
        let expected = Point {
            x: (b.x + dx / dist * push).clamp(-5000.0, 5000.0),
            y: (b.y + dy / dist * push).clamp(-5.0, 5.0),
        };

        let pos = compute_layout(
            LayoutKind::Force,
            &nodes(&["a", "b"]),
            &[],
            &config,
            &CancellationToken::new(),
        )
        .unwrap();
        assert!((pos[1].x - expected.x).abs() < 1e-6, "{:?} vs {:?}", pos[1], expected);
        assert!((pos[1].y - expected.y).abs() < 1e-6, "{:?} vs {:?}", pos[1], expected);
    }

    #[test]
    fn test_force_layout_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let err = compute_layout(
            LayoutKind::Force,
            &nodes(&["a", "b"]),
            &[],
            &seeded(),
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }

    #[test]
    fn test_hierarchical_levels() {
        let ns = nodes(&["root", "left", "right", "leaf"]);
        let es = vec![
            edge("root", "left"),
            edge("root", "right"),
            edge("left", "leaf"),
        ];
        let pos = compute_layout(
            LayoutKind::Hierarchical,
            &ns,
            &es,
            &LayoutConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(pos[0], Point { x: 0.0, y: -300.0 });
        assert_eq!(pos[1].y, -200.0);
        assert_eq!(pos[2].y, -200.0);
        assert!((pos[1].x - (-400.0 + 800.0 / 3.0)).abs() < 1e-9);
        assert_eq!(pos[3].y, -100.0);
    }

    #[test]
    fn test_hierarchical_cycle_without_roots() {
        let ns = nodes(&["a", "b"]);
        let es = vec![edge("a", "b"), edge("b", "a")];
        let pos = hierarchical(&ns, &es, &LayoutConfig::default());
        assert!(pos.iter().all(|p| p.y == -300.0));
    }

    #[test]
    fn test_circular_radius() {
        let pos = circular(4, &LayoutConfig::default());
        assert!((pos[0].x - 300.0).abs() < 1e-9);
        assert!((pos[1].y - 300.0).abs() < 1e-9);
        for p in &pos {
            assert!((p.x.hypot(p.y) - 300.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_geographic_projection_and_fallback() {
        let ns = vec![
            Node::new("paris", NodeType::Location, "Paris")
                .with_property("latitude", 0.0)
                .with_property("longitude", 0.0),
            Node::new("corner", NodeType::Location, "NW")
                .with_property("latitude", 90.0)
                .with_property("longitude", -180.0),
            Node::new("nowhere", NodeType::User, "?"),
        ];
        let pos = geographic(&ns, &seeded());
        let close = |p: Point, x: f64, y: f64| (p.x - x).abs() < 1e-9 && (p.y - y).abs() < 1e-9;
        assert!(close(pos[0], 0.0, 0.0), "got {:?}", pos[0]);
        assert!(close(pos[1], -400.0, -300.0), "got {:?}", pos[1]);
        assert!(pos[2].x.abs() <= 400.0 && pos[2].y.abs() <= 300.0);
    }

    #[test]
    fn test_styling() {
        assert_eq!(node_color(NodeType::Event), "#FB923C");
        assert_eq!(edge_color(EdgeType::Likes), "#F472B6");
        assert_eq!(node_size(0.5), 15.0);
        assert_eq!(edge_width(0.1), 1.0);
        assert_eq!(edge_width(2.0), 6.0);

        let visual = VisualEdge::styled(edge("a", "b"));
        let json = serde_json::to_value(&visual).unwrap();
        assert_eq!(json["source"], "a");
        assert_eq!(json["type"], "follows");
        assert_eq!(json["curved"], true);
    }
}
