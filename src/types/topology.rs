use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyMode {
    #[default]
    Hierarchical,
    Mesh,
    Hybrid,
    Adaptive,
}

impl TopologyMode {
    pub fn as_str(&self) -> &str {
        match self {
            TopologyMode::Hierarchical => "hierarchical",
            TopologyMode::Mesh => "mesh",
            TopologyMode::Hybrid => "hybrid",
            TopologyMode::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hierarchical" => Ok(TopologyMode::Hierarchical),
            "mesh" => Ok(TopologyMode::Mesh),
            "hybrid" => Ok(TopologyMode::Hybrid),
            "adaptive" => Ok(TopologyMode::Adaptive),
            other => Err(format!("unknown topology mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyState {
    pub mode: TopologyMode,
    pub node_count: usize,
    pub connection_count: usize,
    pub efficiency: f64,
    pub last_changed: DateTime<Utc>,
}

pub const COORDINATOR_NODE: &str = "coordinator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Connectivity view handed to the resilience analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetGraph {
    pub mode: TopologyMode,
    /// The pattern actually used to lay out edges; differs from `mode` only
    /// for adaptive topologies.
    pub effective_mode: TopologyMode,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl FleetGraph {
    /// Lays out the coordinator plus `agents` using the edge pattern of
    /// `effective_mode`: a star on the coordinator for hierarchical, a
    /// complete graph for mesh, and a star with paired peers for hybrid.
    pub fn build(mode: TopologyMode, effective_mode: TopologyMode, agents: Vec<GraphNode>) -> Self {
        let mut nodes = Vec::with_capacity(agents.len() + 1);
        nodes.push(GraphNode::new(COORDINATOR_NODE, COORDINATOR_NODE));
        nodes.extend(agents);

        let mut edges = Vec::new();
        match effective_mode {
            TopologyMode::Mesh => {
                for (i, a) in nodes.iter().enumerate() {
                    for b in &nodes[i + 1..] {
                        edges.push(GraphEdge::new(a.id.clone(), b.id.clone()));
                    }
                }
            }
            TopologyMode::Hybrid => {
                for agent in &nodes[1..] {
                    edges.push(GraphEdge::new(COORDINATOR_NODE, agent.id.clone()));
                }
                for pair in nodes[1..].chunks_exact(2) {
                    edges.push(GraphEdge::new(pair[0].id.clone(), pair[1].id.clone()));
                }
            }
            TopologyMode::Hierarchical | TopologyMode::Adaptive => {
                for agent in &nodes[1..] {
                    edges.push(GraphEdge::new(COORDINATOR_NODE, agent.id.clone()));
                }
            }
        }

        Self {
            mode,
            effective_mode,
            nodes,
            edges,
        }
    }

    /// Agent nodes, without the coordinator.
    pub fn agent_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.id != COORDINATOR_NODE)
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            if let (Some(a), Some(b)) = (self.node_index(&edge.source), self.node_index(&edge.target))
            {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        adjacency
    }
}
