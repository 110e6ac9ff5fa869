use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::types::AgentId;

/// Last-seen timestamps for confirmed agents.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatTracker {
    last_seen: HashMap<AgentId, DateTime<Utc>>,
}

impl HeartbeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, agent_id: AgentId, at: DateTime<Utc>) {
        self.last_seen.insert(agent_id, at);
    }

    /// Refreshes a tracked agent. Heartbeats from untracked agents are ignored.
    pub fn beat(&mut self, agent_id: &AgentId, at: DateTime<Utc>) -> bool {
        match self.last_seen.get_mut(agent_id) {
            Some(last) => {
                if at > *last {
                    *last = at;
                }
                true
            }
            None => false,
        }
    }

    pub fn untrack(&mut self, agent_id: &AgentId) -> bool {
        self.last_seen.remove(agent_id).is_some()
    }

    pub fn last_seen(&self, agent_id: &AgentId) -> Option<DateTime<Utc>> {
        self.last_seen.get(agent_id).copied()
    }

    /// Agents whose last heartbeat is strictly older than `timeout`.
    pub fn stale(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<AgentId> {
        let mut stale: Vec<(AgentId, DateTime<Utc>)> = self
            .last_seen
            .iter()
            .filter(|(_, last)| now.signed_duration_since(**last) > timeout)
            .map(|(id, last)| (*id, *last))
            .collect();
        stale.sort_by_key(|(_, last)| *last);
        stale.into_iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
