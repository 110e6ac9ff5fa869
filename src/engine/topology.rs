use chrono::Utc;

use crate::resilience::ResilienceReport;
use crate::types::{FleetGraph, GraphNode, TopologyMode, TopologyState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionProfile {
    pub effective_mode: TopologyMode,
    pub connection_count: usize,
    pub efficiency: f64,
}

/// Connection count and efficiency for `mode` over `nodes` agents at fleet
/// utilization `utilization`.
pub fn connection_profile(mode: TopologyMode, nodes: usize, utilization: f64) -> ConnectionProfile {
    let hierarchical = nodes.saturating_sub(1);
    let mesh = if nodes > 1 { nodes * (nodes - 1) / 2 } else { 0 };
    let hybrid = hierarchical + nodes / 2;

    match mode {
        TopologyMode::Hierarchical => ConnectionProfile {
            effective_mode: mode,
            connection_count: hierarchical,
            efficiency: 1.0,
        },
        TopologyMode::Mesh => ConnectionProfile {
            effective_mode: mode,
            connection_count: mesh,
            efficiency: if nodes > 1 { 0.9 } else { 1.0 },
        },
        TopologyMode::Hybrid => ConnectionProfile {
            effective_mode: mode,
            connection_count: hybrid,
            efficiency: 0.95,
        },
        TopologyMode::Adaptive => {
            let (effective_mode, connection_count) = if utilization < 0.3 {
                (TopologyMode::Hierarchical, hierarchical)
            } else if utilization < 0.7 {
                (TopologyMode::Hybrid, hybrid)
            } else {
                (TopologyMode::Mesh, mesh)
            };
            ConnectionProfile {
                effective_mode,
                connection_count,
                efficiency: 1.0 - 0.1 * utilization,
            }
        }
    }
}

#[derive(Debug)]
pub struct TopologyManager {
    state: TopologyState,
    effective_mode: TopologyMode,
    utilization: f64,
    last_analysis: Option<ResilienceReport>,
}

impl TopologyManager {
    pub fn new(mode: TopologyMode) -> Self {
        let mut manager = Self {
            state: TopologyState {
                mode,
                node_count: 0,
                connection_count: 0,
                efficiency: 1.0,
                last_changed: Utc::now(),
            },
            effective_mode: mode,
            utilization: 0.0,
            last_analysis: None,
        };
        manager.recompute();
        manager
    }

    pub fn state(&self) -> &TopologyState {
        &self.state
    }

    pub fn mode(&self) -> TopologyMode {
        self.state.mode
    }

    pub fn effective_mode(&self) -> TopologyMode {
        self.effective_mode
    }

    /// Switches mode and returns the previous one. Changing to the current
    /// mode still recomputes and restamps.
    pub fn change(&mut self, mode: TopologyMode) -> TopologyMode {
        let old = self.state.mode;
        self.state.mode = mode;
        self.recompute();
        self.state.last_changed = Utc::now();
        old
    }

    /// Updates the inputs of the recompute rule. Returns whether the derived
    /// connection count changed.
    pub fn update(&mut self, node_count: usize, utilization: f64) -> bool {
        let before = self.state.connection_count;
        self.state.node_count = node_count;
        self.utilization = utilization;
        self.recompute();
        before != self.state.connection_count
    }

    fn recompute(&mut self) {
        let profile = connection_profile(self.state.mode, self.state.node_count, self.utilization);
        self.effective_mode = profile.effective_mode;
        self.state.connection_count = profile.connection_count;
        self.state.efficiency = profile.efficiency;
    }

    pub fn build_graph(&self, agents: Vec<GraphNode>) -> FleetGraph {
        FleetGraph::build(self.state.mode, self.effective_mode, agents)
    }

    pub fn cache_analysis(&mut self, report: ResilienceReport) {
        self.last_analysis = Some(report);
    }

    pub fn last_analysis(&self) -> Option<&ResilienceReport> {
        self.last_analysis.as_ref()
    }

    /// Adopts persisted state. Node count and utilization are overwritten by
    /// the next `update` from live data.
    pub fn restore(&mut self, state: TopologyState) {
        self.state = state;
        self.recompute();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_with_five_nodes() {
        let profile = connection_profile(TopologyMode::Mesh, 5, 0.0);
        assert_eq!(profile.connection_count, 10);
        assert_eq!(profile.efficiency, 0.9);
    }

    #[test]
    fn test_single_node_profiles() {
        assert_eq!(connection_profile(TopologyMode::Mesh, 1, 0.0).efficiency, 1.0);
        assert_eq!(connection_profile(TopologyMode::Mesh, 1, 0.0).connection_count, 0);
        assert_eq!(connection_profile(TopologyMode::Hierarchical, 0, 0.0).connection_count, 0);
        assert_eq!(connection_profile(TopologyMode::Hybrid, 1, 0.0).connection_count, 0);
    }

    #[test]
    fn test_hybrid_profile() {
        let profile = connection_profile(TopologyMode::Hybrid, 5, 0.5);
        assert_eq!(profile.connection_count, 4 + 2);
        assert_eq!(profile.efficiency, 0.95);
    }

    #[test]
    fn test_adaptive_follows_utilization() {
        let low = connection_profile(TopologyMode::Adaptive, 6, 0.1);
        assert_eq!(low.effective_mode, TopologyMode::Hierarchical);
        assert_eq!(low.connection_count, 5);

        let mid = connection_profile(TopologyMode::Adaptive, 6, 0.3);
        assert_eq!(mid.effective_mode, TopologyMode::Hybrid);
        assert_eq!(mid.connection_count, 8);

        let high = connection_profile(TopologyMode::Adaptive, 6, 0.7);
        assert_eq!(high.effective_mode, TopologyMode::Mesh);
        assert_eq!(high.connection_count, 15);
        assert!((high.efficiency - 0.93).abs() < 1e-9);
    }

    #[test]
    fn test_change_is_idempotent() {
        let mut manager = TopologyManager::new(TopologyMode::Hierarchical);
        manager.update(5, 0.2);
        manager.change(TopologyMode::Mesh);
        let first = manager.state().clone();

        let old = manager.change(TopologyMode::Mesh);

        assert_eq!(old, TopologyMode::Mesh);
        assert_eq!(manager.state().connection_count, first.connection_count);
        assert_eq!(manager.state().efficiency, first.efficiency);
    }

    #[test]
    fn test_update_reports_change() {
        let mut manager = TopologyManager::new(TopologyMode::Hierarchical);
        assert!(manager.update(3, 0.0));
        assert!(!manager.update(3, 0.5));
    }

    #[test]
    fn test_graph_uses_effective_mode() {
        let mut manager = TopologyManager::new(TopologyMode::Adaptive);
        manager.update(2, 0.9);
        let graph = manager.build_graph(vec![
            GraphNode::new("a", "worker"),
            GraphNode::new("b", "worker"),
        ]);

        assert_eq!(graph.mode, TopologyMode::Adaptive);
        assert_eq!(graph.effective_mode, TopologyMode::Mesh);
        assert_eq!(graph.edges.len(), 3);
    }
}
