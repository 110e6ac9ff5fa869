use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, AgentSpawnConfig, ResourceAllocation, Severity, TopologyMode};
use crate::error::FleetError;

fn default_count() -> usize {
    1
}

/// Requests accepted by the coordinator's task boundary.
///
/// Serialized as `{"type": "<task-type>", ...camelCase fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FleetTask {
    FleetInitialize,
    AgentSpawn {
        agent_type: String,
        #[serde(default = "default_count")]
        count: usize,
        #[serde(default)]
        config: Option<AgentSpawnConfig>,
    },
    AgentTerminate {
        agent_id: AgentId,
        #[serde(default)]
        reason: Option<String>,
    },
    TopologyChange {
        mode: TopologyMode,
        #[serde(default)]
        reason: Option<String>,
    },
    RebalanceLoad,
    ResolveConflict {
        /// Kept as a string so unsupported types surface as a task error.
        conflict_type: String,
        agents: Vec<AgentId>,
        #[serde(default)]
        severity: Severity,
        #[serde(default)]
        allocation: Option<ResourceAllocation>,
    },
    FleetStatus,
    FleetMetrics,
    ScalePool {
        agent_type: String,
        target_count: usize,
    },
    RecoverAgent {
        agent_id: AgentId,
    },
    TopologyAnalyze,
    TopologySpofCheck,
    TopologyOptimize,
}

pub const TASK_TYPES: [&str; 13] = [
    "fleet-initialize",
    "agent-spawn",
    "agent-terminate",
    "topology-change",
    "rebalance-load",
    "resolve-conflict",
    "fleet-status",
    "fleet-metrics",
    "scale-pool",
    "recover-agent",
    "topology-analyze",
    "topology-spof-check",
    "topology-optimize",
];

impl FleetTask {
    pub fn task_type(&self) -> &'static str {
        match self {
            FleetTask::FleetInitialize => "fleet-initialize",
            FleetTask::AgentSpawn { .. } => "agent-spawn",
            FleetTask::AgentTerminate { .. } => "agent-terminate",
            FleetTask::TopologyChange { .. } => "topology-change",
            FleetTask::RebalanceLoad => "rebalance-load",
            FleetTask::ResolveConflict { .. } => "resolve-conflict",
            FleetTask::FleetStatus => "fleet-status",
            FleetTask::FleetMetrics => "fleet-metrics",
            FleetTask::ScalePool { .. } => "scale-pool",
            FleetTask::RecoverAgent { .. } => "recover-agent",
            FleetTask::TopologyAnalyze => "topology-analyze",
            FleetTask::TopologySpofCheck => "topology-spof-check",
            FleetTask::TopologyOptimize => "topology-optimize",
        }
    }

    /// Parses a raw task payload, telling unknown task types apart from
    /// malformed payloads of a known type.
    pub fn parse(payload: Value) -> Result<Self, FleetError> {
        let task_type = payload
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FleetError::UnknownTaskType("<missing>".to_string()))?;

        if !TASK_TYPES.contains(&task_type.as_str()) {
            return Err(FleetError::UnknownTaskType(task_type));
        }

        serde_json::from_value(payload).map_err(|e| FleetError::InvalidTask {
            task_type,
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub task_type: String,
    pub success: bool,
    pub output: Value,
    pub completed_at: DateTime<Utc>,
}
