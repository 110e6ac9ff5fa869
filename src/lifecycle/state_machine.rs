use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};
use crate::types::{AgentRecord, AgentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    SpawnConfirmed,
    TaskAssigned,
    TaskFinished,
    Failure,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleEvent::SpawnConfirmed => "SpawnConfirmed",
            LifecycleEvent::TaskAssigned => "TaskAssigned",
            LifecycleEvent::TaskFinished => "TaskFinished",
            LifecycleEvent::Failure => "Failure",
        }
    }
}

pub struct AgentStateMachine;

impl AgentStateMachine {
    pub fn transition(record: &mut AgentRecord, event: LifecycleEvent) -> FleetResult<AgentStatus> {
        let new_status = match (record.status, event) {
            (AgentStatus::Pending, LifecycleEvent::SpawnConfirmed) => AgentStatus::Idle,
            (AgentStatus::Idle, LifecycleEvent::TaskAssigned) => AgentStatus::Busy,
            (AgentStatus::Busy, LifecycleEvent::TaskFinished) => AgentStatus::Idle,
            (
                AgentStatus::Pending | AgentStatus::Idle | AgentStatus::Busy,
                LifecycleEvent::Failure,
            ) => AgentStatus::Failed,
            (from, event) => {
                return Err(FleetError::InvalidTransition {
                    agent_id: record.agent_id,
                    from,
                    event: event.as_str().to_string(),
                });
            }
        };

        record.status = new_status;
        Ok(new_status)
    }
}
