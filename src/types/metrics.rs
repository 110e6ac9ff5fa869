use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetMetrics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub busy_agents: usize,
    pub failed_agents: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub queued_tasks: usize,
    pub utilization: f64,
    pub failure_rate: f64,
    /// Completed tasks per minute since the fleet started.
    pub throughput: f64,
    pub collected_at: DateTime<Utc>,
}
