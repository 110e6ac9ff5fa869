use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AgentId, ConflictId, ResourceAllocation, Severity};
use crate::error::FleetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    ResourceContention,
    Deadlock,
    PriorityConflict,
}

impl ConflictType {
    pub fn as_str(&self) -> &str {
        match self {
            ConflictType::ResourceContention => "resource-contention",
            ConflictType::Deadlock => "deadlock",
            ConflictType::PriorityConflict => "priority-conflict",
        }
    }

    pub fn strategy(&self) -> &str {
        match self {
            ConflictType::ResourceContention => "priority-based-allocation",
            ConflictType::Deadlock => "victim-selection",
            ConflictType::PriorityConflict => "priority-queue",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictType {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource-contention" => Ok(ConflictType::ResourceContention),
            "deadlock" => Ok(ConflictType::Deadlock),
            "priority-conflict" => Ok(ConflictType::PriorityConflict),
            other => Err(FleetError::UnknownConflictType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRequest {
    pub conflict_type: ConflictType,
    pub agents: Vec<AgentId>,
    pub severity: Severity,
    pub allocation: Option<ResourceAllocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ConflictResolution {
    Allocation {
        granted: Vec<AgentId>,
        deferred: Vec<AgentId>,
    },
    AbortAndRetry {
        victim: AgentId,
        action: String,
    },
    ExecutionOrder {
        order: Vec<AgentId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: ConflictId,
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub agents: Vec<AgentId>,
    pub severity: Severity,
    pub strategy: String,
    pub resolved: bool,
    pub timestamp: DateTime<Utc>,
    pub resolution: Option<ConflictResolution>,
}

impl ConflictRecord {
    pub fn open(request: &ConflictRequest) -> Self {
        Self {
            id: ConflictId::new_v4(),
            conflict_type: request.conflict_type,
            agents: request.agents.clone(),
            severity: request.severity,
            strategy: request.conflict_type.strategy().to_string(),
            resolved: false,
            timestamp: Utc::now(),
            resolution: None,
        }
    }

    /// Records the outcome. A record is resolved exactly once.
    pub fn close(&mut self, resolution: ConflictResolution) {
        if self.resolved {
            return;
        }
        self.resolution = Some(resolution);
        self.resolved = true;
    }
}
