use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingAction {
    ScaleUp,
    ScaleDown,
    NoAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingDecision {
    pub action: ScalingAction,
    pub agent_type: Option<String>,
    pub current_count: usize,
    pub target_count: usize,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ScalingDecision {
    pub fn no_action(agent_type: Option<String>, current_count: usize, reason: impl Into<String>) -> Self {
        Self {
            action: ScalingAction::NoAction,
            agent_type,
            current_count,
            target_count: current_count,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn delta(&self) -> usize {
        self.target_count.abs_diff(self.current_count)
    }
}
