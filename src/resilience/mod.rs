pub mod articulation;

pub use articulation::ArticulationPointAnalyzer;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FleetGraph, Severity, TopologyMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceReport {
    /// In `[0, 1]`, higher is better.
    pub score: f64,
    pub grade: String,
    pub critical_spofs: Vec<String>,
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpofResult {
    pub node_id: String,
    pub role: String,
    pub severity: Severity,
    /// Nodes cut off from the largest remaining component if this one fails.
    pub disconnected_nodes: usize,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimization {
    pub description: String,
    pub suggested_mode: Option<TopologyMode>,
    pub expected_score_gain: f64,
}

pub fn grade_for(score: f64) -> &'static str {
    if score >= 0.9 {
        "A"
    } else if score >= 0.8 {
        "B"
    } else if score >= 0.7 {
        "C"
    } else if score >= 0.6 {
        "D"
    } else {
        "F"
    }
}

/// Graph analysis consumed by the topology manager. Implementations are
/// treated as black boxes and may be slow or remote.
#[async_trait]
pub trait ResilienceAnalyzer: Send + Sync {
    async fn analyze_resilience(&self, graph: &FleetGraph) -> Result<ResilienceReport>;

    async fn detect_spofs(&self, graph: &FleetGraph) -> Result<Vec<SpofResult>>;

    async fn suggest_optimizations(
        &self,
        graph: &FleetGraph,
        last: Option<&ResilienceReport>,
    ) -> Result<Vec<Optimization>>;
}
