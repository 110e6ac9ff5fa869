pub mod bus;

pub use bus::{EventBus, EventBusError, EventReceiver};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AgentId, AgentSpawnConfig, Priority, TopologyMode};

fn default_success() -> bool {
    true
}

/// Everything that crosses the fleet event bus, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum FleetEvent {
    // Emitted by the coordinator
    #[serde(rename = "agent.spawn-request")]
    SpawnRequested {
        agent_id: AgentId,
        #[serde(rename = "type")]
        agent_type: String,
        priority: Priority,
        config: AgentSpawnConfig,
    },
    #[serde(rename = "agent.terminate-request")]
    TerminateRequested { agent_id: AgentId, reason: String },
    #[serde(rename = "fleet.topology-changed")]
    TopologyChanged {
        old_mode: TopologyMode,
        new_mode: TopologyMode,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "fleet.spof-warning")]
    SpofWarning {
        critical_spofs: Vec<String>,
        resilience_score: f64,
        grade: String,
        recommendations: Vec<String>,
    },
    #[serde(rename = "fleet-pool-changed")]
    PoolChanged { agent_type: String },

    // Consumed by the coordinator
    #[serde(rename = "agent.spawned")]
    AgentSpawned {
        agent_id: AgentId,
        #[serde(rename = "type")]
        agent_type: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },
    #[serde(rename = "agent.terminated")]
    AgentTerminated {
        agent_id: AgentId,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "agent.error")]
    AgentError {
        agent_id: AgentId,
        error: String,
        #[serde(default)]
        context: Option<Value>,
    },
    #[serde(rename = "agent.heartbeat")]
    AgentHeartbeat { agent_id: AgentId },
    #[serde(rename = "task:submitted")]
    TaskSubmitted {
        task_id: String,
        #[serde(default)]
        agent_type: Option<String>,
    },
    #[serde(rename = "task:completed")]
    TaskCompleted {
        task_id: String,
        agent_id: AgentId,
        #[serde(default = "default_success")]
        success: bool,
    },
}

impl FleetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::SpawnRequested { .. } => "agent.spawn-request",
            FleetEvent::TerminateRequested { .. } => "agent.terminate-request",
            FleetEvent::TopologyChanged { .. } => "fleet.topology-changed",
            FleetEvent::SpofWarning { .. } => "fleet.spof-warning",
            FleetEvent::PoolChanged { .. } => "fleet-pool-changed",
            FleetEvent::AgentSpawned { .. } => "agent.spawned",
            FleetEvent::AgentTerminated { .. } => "agent.terminated",
            FleetEvent::AgentError { .. } => "agent.error",
            FleetEvent::AgentHeartbeat { .. } => "agent.heartbeat",
            FleetEvent::TaskSubmitted { .. } => "task:submitted",
            FleetEvent::TaskCompleted { .. } => "task:completed",
        }
    }

    /// Events the coordinator reacts to, as opposed to ones it emits.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            FleetEvent::AgentSpawned { .. }
                | FleetEvent::AgentTerminated { .. }
                | FleetEvent::AgentError { .. }
                | FleetEvent::AgentHeartbeat { .. }
                | FleetEvent::TaskSubmitted { .. }
                | FleetEvent::TaskCompleted { .. }
        )
    }
}
