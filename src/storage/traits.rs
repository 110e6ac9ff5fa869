use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Persistent key-value store shared with the rest of the system.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn store(&self, key: &str, value: Value, ttl_seconds: Option<u64>) -> Result<()>;
    async fn retrieve(&self, key: &str) -> Result<Option<Value>>;
    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

pub mod keys {
    use crate::types::{AgentId, ConflictId};

    pub const TOPOLOGY: &str = "fleet/topology";
    pub const POOLS: &str = "fleet/agents/pools";
    pub const ALLOCATIONS: &str = "fleet/resources/allocation";
    pub const METRICS: &str = "fleet/metrics/performance";

    /// Seven days, applied to persisted task failures.
    pub const ERROR_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

    pub fn conflict(id: &ConflictId) -> String {
        format!("fleet/conflicts/{}", id)
    }

    pub fn agent(id: &AgentId) -> String {
        format!("fleet/agents/{}", id)
    }

    pub fn task_error(task_id: &str) -> String {
        format!("fleet/errors/{}", task_id)
    }
}
