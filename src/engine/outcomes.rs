use serde::{Deserialize, Serialize};

use super::reconcile::ReconciliationReport;
use crate::resilience::ResilienceReport;
use crate::types::{
    AgentId, AgentPool, FleetMetrics, FleetStatus, Priority, ScalingDecision, TopologyMode,
    TopologyState,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResult {
    pub agent_type: String,
    pub priority: Priority,
    pub agent_ids: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub spawned: Vec<SpawnResult>,
    pub topology: TopologyState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateResult {
    pub agent_id: AgentId,
    pub released_allocation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub agent_id: AgentId,
    pub recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_agent_id: Option<AgentId>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RecoveryResult {
    pub fn recovered(agent_id: AgentId, new_agent_id: AgentId, attempts: u32) -> Self {
        Self {
            agent_id,
            recovered: true,
            new_agent_id: Some(new_agent_id),
            attempts,
            reason: None,
        }
    }

    pub fn exhausted(agent_id: AgentId, attempts: u32) -> Self {
        Self {
            agent_id,
            recovered: false,
            new_agent_id: None,
            attempts,
            reason: Some("max-retries-exceeded".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleResult {
    pub agent_type: String,
    pub previous_count: usize,
    pub target_count: usize,
    pub spawned: Vec<AgentId>,
    pub terminated: Vec<AgentId>,
    /// False when only part of the change could be issued.
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleOutcome {
    pub decision: ScalingDecision,
    pub result: Option<ScaleResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub task_id: String,
    pub agent_id: AgentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceResult {
    pub assigned: Vec<TaskAssignment>,
    pub queued: usize,
    pub reconciliation: ReconciliationReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyChangeResult {
    pub old_mode: TopologyMode,
    pub new_mode: TopologyMode,
    pub effective_mode: TopologyMode,
    pub connection_count: usize,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub fleet_id: String,
    pub status: FleetStatus,
    pub pools: Vec<AgentPool>,
    pub topology: TopologyState,
    pub effective_mode: TopologyMode,
    pub metrics: FleetMetrics,
    pub resilience: Option<ResilienceReport>,
    pub recent_scaling: Vec<ScalingDecision>,
    pub conflicts_resolved: usize,
    pub reconciliation: ReconciliationReport,
    pub uptime_seconds: i64,
}

/// What `restore_state` managed to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub topology: bool,
    pub pools: usize,
    /// Agent records brought back alongside their allocations.
    pub agents: usize,
    pub allocations: usize,
    /// Persisted allocations dropped because their agent record was gone.
    pub orphaned_allocations: usize,
    pub metrics: bool,
}
