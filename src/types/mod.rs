pub mod agent;
pub mod conflict;
pub mod metrics;
pub mod pool;
pub mod resource;
pub mod scaling;
pub mod task;
pub mod topology;

pub use agent::{AgentRecord, AgentSpawnConfig, QueuedTask};
pub use conflict::{ConflictRecord, ConflictRequest, ConflictResolution, ConflictType};
pub use metrics::FleetMetrics;
pub use pool::AgentPool;
pub use resource::{parse_memory_mb, ResourceAllocation};
pub use scaling::{ScalingAction, ScalingDecision};
pub use task::{FleetTask, TaskResult};
pub use topology::{FleetGraph, GraphEdge, GraphNode, TopologyMode, TopologyState};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type AgentId = Uuid;
pub type ConflictId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Ordering weight used when ranking contenders.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FleetStatus {
    Initializing,
    Active,
    ShuttingDown,
    Stopped,
}

impl FleetStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FleetStatus::Initializing => "initializing",
            FleetStatus::Active => "active",
            FleetStatus::ShuttingDown => "shutting-down",
            FleetStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending, // Spawn intent issued, not yet confirmed
    Idle,    // Confirmed, available for work
    Busy,    // Executing a task
    Failed,  // Heartbeat lost or agent reported an error
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Failed => "failed",
        }
    }
}
