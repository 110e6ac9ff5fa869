use thiserror::Error;

use crate::types::{AgentId, AgentStatus};

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Unknown conflict type: {0}")]
    UnknownConflictType(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Invalid {task_type} task: {message}")]
    InvalidTask { task_type: String, message: String },

    #[error("Pool capacity exceeded for {agent_type}: {current} + {requested} > maxSize {limit}")]
    PoolCapacityExceeded {
        agent_type: String,
        current: usize,
        requested: usize,
        limit: usize,
    },

    #[error("Fleet capacity exceeded: {current} + {requested} > maxAgents {limit}")]
    FleetCapacityExceeded {
        current: usize,
        requested: usize,
        limit: usize,
    },

    #[error("Scale target {target} for {agent_type} is outside [{min}, {max}]")]
    InvalidScaleTarget {
        agent_type: String,
        target: usize,
        min: usize,
        max: usize,
    },

    #[error("Conflict must name at least one agent")]
    EmptyConflict,

    #[error("Invalid transition for agent {agent_id}: {event} while {from:?}")]
    InvalidTransition {
        agent_id: AgentId,
        from: AgentStatus,
        event: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Resilience analyzer error: {0}")]
    Analyzer(#[source] anyhow::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl FleetError {
    /// Validation errors are reported to the caller and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FleetError::UnknownAgentType(_)
                | FleetError::UnknownAgent(_)
                | FleetError::UnknownConflictType(_)
                | FleetError::UnknownTaskType(_)
                | FleetError::InvalidTask { .. }
                | FleetError::PoolCapacityExceeded { .. }
                | FleetError::FleetCapacityExceeded { .. }
                | FleetError::InvalidScaleTarget { .. }
                | FleetError::EmptyConflict
                | FleetError::InvalidConfig(_)
        )
    }

    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            FleetError::PoolCapacityExceeded { .. } | FleetError::FleetCapacityExceeded { .. }
        )
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
