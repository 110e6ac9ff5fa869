use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, AgentStatus, Priority};

/// Resource request carried on a spawn intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpawnConfig {
    pub cpu: f64,
    pub memory: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Default for AgentSpawnConfig {
    fn default() -> Self {
        Self {
            cpu: 0.5,
            memory: "512MB".to_string(),
            capabilities: Vec::new(),
        }
    }
}

/// What the coordinator knows about one agent, from spawn intent onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: AgentId,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub priority: Priority,
    pub config: AgentSpawnConfig,
    pub status: AgentStatus,
    /// Set once a terminate intent has been issued.
    #[serde(default)]
    pub terminating: bool,
    pub current_task: Option<String>,
    pub spawned_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn pending(agent_type: String, priority: Priority, config: AgentSpawnConfig) -> Self {
        Self {
            agent_id: AgentId::new_v4(),
            agent_type,
            priority,
            config,
            status: AgentStatus::Pending,
            terminating: false,
            current_task: None,
            spawned_at: Utc::now(),
            confirmed_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status != AgentStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTask {
    pub task_id: String,
    pub agent_type: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(task_id: String, agent_type: Option<String>) -> Self {
        Self {
            task_id,
            agent_type,
            submitted_at: Utc::now(),
        }
    }

    pub fn accepts(&self, agent_type: &str) -> bool {
        self.agent_type.as_deref().map_or(true, |t| t == agent_type)
    }
}
