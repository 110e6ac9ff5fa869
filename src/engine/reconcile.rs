use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pool_registry::PoolRegistry;
use crate::types::{AgentId, AgentStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDrift {
    pub agent_type: String,
    /// `active + busy` as booked by spawn/terminate.
    pub intended: usize,
    /// Confirmed agents, idle or busy.
    pub observed: usize,
    pub pending: usize,
    pub stale_pending: usize,
    /// `intended - observed - fresh pending`; non-zero means the counters
    /// disagree with the records.
    pub drift: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub pools: Vec<PoolDrift>,
    pub applied: bool,
    pub dropped_agents: Vec<AgentId>,
    pub checked_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn has_drift(&self) -> bool {
        self.pools.iter().any(|p| p.drift != 0)
    }
}

#[derive(Default)]
struct Observed {
    idle: usize,
    busy: usize,
    fresh_pending: usize,
    stale: Vec<AgentId>,
}

/// Compares pool counters with agent records. With `apply`, pending spawns
/// older than `confirm_timeout` are dropped and the counters are rebuilt from
/// the records.
pub fn reconcile(
    registry: &mut PoolRegistry,
    now: DateTime<Utc>,
    confirm_timeout: Duration,
    apply: bool,
) -> ReconciliationReport {
    let mut observed: BTreeMap<String, Observed> = registry
        .pools()
        .map(|p| (p.agent_type.clone(), Observed::default()))
        .collect();

    for record in registry.agents() {
        let Some(entry) = observed.get_mut(&record.agent_type) else {
            continue;
        };
        match record.status {
            AgentStatus::Idle => entry.idle += 1,
            AgentStatus::Busy => entry.busy += 1,
            AgentStatus::Pending => {
                if now.signed_duration_since(record.spawned_at) > confirm_timeout {
                    entry.stale.push(record.agent_id);
                } else {
                    entry.fresh_pending += 1;
                }
            }
            AgentStatus::Failed => {}
        }
    }

    let pools: Vec<PoolDrift> = observed
        .iter()
        .filter_map(|(agent_type, seen)| {
            let pool = registry.pool(agent_type)?;
            let intended = pool.live_count();
            let confirmed = seen.idle + seen.busy;
            let drift = intended as i64 - confirmed as i64 - seen.fresh_pending as i64;
            Some(PoolDrift {
                agent_type: agent_type.clone(),
                intended,
                observed: confirmed,
                pending: seen.fresh_pending + seen.stale.len(),
                stale_pending: seen.stale.len(),
                drift,
            })
        })
        .collect();

    for pool in pools.iter().filter(|p| p.drift != 0) {
        log::warn!(
            "Pool {} drifted by {} (intended {}, observed {}, pending {}, stale {})",
            pool.agent_type,
            pool.drift,
            pool.intended,
            pool.observed,
            pool.pending,
            pool.stale_pending
        );
    }

    let mut dropped_agents = Vec::new();
    if apply {
        for (agent_type, seen) in &observed {
            for agent_id in &seen.stale {
                if registry.drop_pending(agent_id).is_some() {
                    dropped_agents.push(*agent_id);
                }
            }
            if let Some(pool) = registry.pool_mut(agent_type) {
                pool.active = seen.idle + seen.fresh_pending;
                pool.idle = seen.idle;
                pool.busy = seen.busy;
                pool.refresh_utilization();
            }
        }
        if !dropped_agents.is_empty() {
            log::info!("Dropped {} unconfirmed spawns", dropped_agents.len());
        }
    }

    ReconciliationReport {
        pools,
        applied: apply,
        dropped_agents,
        checked_at: now,
    }
}
