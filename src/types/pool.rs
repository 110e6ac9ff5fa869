use serde::{Deserialize, Serialize};

use super::Priority;
use crate::config::PoolConfig;

/// Capacity bookkeeping for one agent type.
///
/// `active` counts live agents that are not executing a task (whether or not
/// the spawn has been confirmed yet), `busy` counts agents executing a task
/// and `idle` is the confirmed subset of `active` that can take work.
/// `failed` is cumulative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPool {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub min_size: usize,
    pub max_size: usize,
    pub priority: Priority,
    pub active: usize,
    pub idle: usize,
    pub busy: usize,
    pub failed: usize,
    pub utilization: f64,
}

impl AgentPool {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            agent_type: config.agent_type.clone(),
            min_size: config.min_size,
            max_size: config.max_size,
            priority: config.priority,
            active: 0,
            idle: 0,
            busy: 0,
            failed: 0,
            utilization: 0.0,
        }
    }

    /// Agents counted against `max_size`.
    pub fn live_count(&self) -> usize {
        self.active + self.busy
    }

    pub fn can_accept(&self, count: usize) -> bool {
        self.live_count() + count <= self.max_size
    }

    pub fn refresh_utilization(&mut self) {
        let total = self.live_count();
        self.utilization = if total == 0 {
            0.0
        } else {
            self.busy as f64 / total as f64
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pool() -> AgentPool {
        AgentPool::from_config(&PoolConfig {
            agent_type: "executor".to_string(),
            min_size: 3,
            max_size: 15,
            priority: Priority::Critical,
        })
    }

    #[test]
    fn test_pool_from_config_starts_empty() {
        let pool = create_test_pool();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.utilization, 0.0);
        assert_eq!(pool.priority, Priority::Critical);
    }

    #[test]
    fn test_can_accept_boundary() {
        let mut pool = create_test_pool();
        pool.active = 3;

        assert!(pool.can_accept(12));
        assert!(!pool.can_accept(13));
    }

    #[test]
    fn test_refresh_utilization() {
        let mut pool = create_test_pool();
        pool.active = 1;
        pool.busy = 9;
        pool.refresh_utilization();

        assert!((pool.utilization - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_serializes_type_field() {
        let pool = create_test_pool();
        let json = serde_json::to_value(&pool).unwrap();

        assert_eq!(json["type"], "executor");
        assert_eq!(json["maxSize"], 15);
    }
}
