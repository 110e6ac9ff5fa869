use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;

use super::{grade_for, Optimization, ResilienceAnalyzer, ResilienceReport, SpofResult};
use crate::types::{FleetGraph, Severity, TopologyMode};

const CUT_WEIGHT: f64 = 0.7;
const SPOF_DENSITY_WEIGHT: f64 = 0.3;

/// Treats articulation points (Tarjan) as single points of failure and scores
/// the graph by how much of it the worst one would cut off.
#[derive(Debug, Clone, Default)]
pub struct ArticulationPointAnalyzer;

impl ArticulationPointAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn spofs(&self, graph: &FleetGraph) -> Vec<SpofResult> {
        let adjacency = graph.adjacency();
        let total = adjacency.len();
        if total < 3 {
            return Vec::new();
        }

        let mut spofs: Vec<SpofResult> = articulation_points(&adjacency)
            .into_iter()
            .map(|v| {
                let largest = largest_component_without(&adjacency, v);
                let disconnected = (total - 1).saturating_sub(largest);
                let fraction = disconnected as f64 / (total - 1) as f64;
                let severity = if fraction >= 0.5 {
                    Severity::Critical
                } else if fraction >= 0.25 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                SpofResult {
                    node_id: graph.nodes[v].id.clone(),
                    role: graph.nodes[v].role.clone(),
                    severity,
                    disconnected_nodes: disconnected,
                    critical: severity == Severity::Critical,
                }
            })
            .collect();

        spofs.sort_by(|a, b| b.disconnected_nodes.cmp(&a.disconnected_nodes));
        spofs
    }

    fn score(&self, graph: &FleetGraph, spofs: &[SpofResult]) -> f64 {
        let total = graph.nodes.len();
        if total < 3 || spofs.is_empty() {
            return 1.0;
        }
        let worst = spofs
            .iter()
            .map(|s| s.disconnected_nodes)
            .max()
            .unwrap_or(0) as f64
            / (total - 1) as f64;
        let density = spofs.len() as f64 / total as f64;
        (1.0 - worst * CUT_WEIGHT - density * SPOF_DENSITY_WEIGHT).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl ResilienceAnalyzer for ArticulationPointAnalyzer {
    async fn analyze_resilience(&self, graph: &FleetGraph) -> Result<ResilienceReport> {
        let spofs = self.spofs(graph);
        let score = self.score(graph, &spofs);

        let critical_spofs: Vec<String> = spofs
            .iter()
            .filter(|s| s.critical)
            .map(|s| s.node_id.clone())
            .collect();

        let mut recommendations: Vec<String> = critical_spofs
            .iter()
            .map(|id| format!("Add redundant links around {}", id))
            .collect();
        if !spofs.is_empty() && graph.effective_mode != TopologyMode::Mesh {
            recommendations.push(format!(
                "Consider a denser topology than {} to remove single points of failure",
                graph.effective_mode
            ));
        }

        Ok(ResilienceReport {
            score,
            grade: grade_for(score).to_string(),
            critical_spofs,
            recommendations,
            analyzed_at: Utc::now(),
        })
    }

    async fn detect_spofs(&self, graph: &FleetGraph) -> Result<Vec<SpofResult>> {
        Ok(self.spofs(graph))
    }

    async fn suggest_optimizations(
        &self,
        graph: &FleetGraph,
        last: Option<&ResilienceReport>,
    ) -> Result<Vec<Optimization>> {
        let spofs = self.spofs(graph);
        if spofs.is_empty() {
            return Ok(Vec::new());
        }
        let baseline = last
            .map(|report| report.score)
            .unwrap_or_else(|| self.score(graph, &spofs));

        let candidates: &[TopologyMode] = match graph.effective_mode {
            TopologyMode::Hierarchical | TopologyMode::Adaptive => {
                &[TopologyMode::Hybrid, TopologyMode::Mesh]
            }
            TopologyMode::Hybrid => &[TopologyMode::Mesh],
            TopologyMode::Mesh => &[],
        };

        let agents: Vec<_> = graph.agent_nodes().cloned().collect();
        let mut optimizations: Vec<Optimization> = candidates
            .iter()
            .filter_map(|mode| {
                let alternative = FleetGraph::build(*mode, *mode, agents.clone());
                let alt_spofs = self.spofs(&alternative);
                let gain = self.score(&alternative, &alt_spofs) - baseline;
                (gain > 0.0).then(|| Optimization {
                    description: format!(
                        "Switch to {} topology ({} single points of failure remaining)",
                        mode,
                        alt_spofs.len()
                    ),
                    suggested_mode: Some(*mode),
                    expected_score_gain: gain,
                })
            })
            .collect();

        optimizations.sort_by(|a, b| b.expected_score_gain.total_cmp(&a.expected_score_gain));
        Ok(optimizations)
    }
}

fn articulation_points(adjacency: &[Vec<usize>]) -> Vec<usize> {
    struct Dfs<'a> {
        adjacency: &'a [Vec<usize>],
        discovery: Vec<Option<usize>>,
        low: Vec<usize>,
        is_cut: Vec<bool>,
        time: usize,
    }

    impl Dfs<'_> {
        fn visit(&mut self, v: usize, parent: Option<usize>) {
            self.discovery[v] = Some(self.time);
            self.low[v] = self.time;
            self.time += 1;
            let mut children = 0;

            for &w in &self.adjacency[v] {
                match self.discovery[w] {
                    None => {
                        children += 1;
                        self.visit(w, Some(v));
                        self.low[v] = self.low[v].min(self.low[w]);
                        if parent.is_some() && self.low[w] >= self.discovery[v].unwrap_or(0) {
                            self.is_cut[v] = true;
                        }
                    }
                    Some(d) if Some(w) != parent => {
                        self.low[v] = self.low[v].min(d);
                    }
                    Some(_) => {}
                }
            }

            if parent.is_none() && children > 1 {
                self.is_cut[v] = true;
            }
        }
    }

    let n = adjacency.len();
    let mut dfs = Dfs {
        adjacency,
        discovery: vec![None; n],
        low: vec![0; n],
        is_cut: vec![false; n],
        time: 0,
    };
    for v in 0..n {
        if dfs.discovery[v].is_none() {
            dfs.visit(v, None);
        }
    }

    (0..n).filter(|&v| dfs.is_cut[v]).collect()
}

fn largest_component_without(adjacency: &[Vec<usize>], removed: usize) -> usize {
    let mut seen = vec![false; adjacency.len()];
    seen[removed] = true;
    let mut largest = 0;

    for start in 0..adjacency.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut size = 0;
        while let Some(v) = queue.pop_front() {
            size += 1;
            for &w in &adjacency[v] {
                if !seen[w] {
                    seen[w] = true;
                    queue.push_back(w);
                }
            }
        }
        largest = largest.max(size);
    }

    largest
}
