use std::collections::{HashMap, VecDeque};

use super::resource_ledger::LedgerCapacity;
use crate::error::{FleetError, FleetResult};
use crate::types::{
    AgentId, ConflictId, ConflictRecord, ConflictRequest, ConflictResolution, ConflictType, Priority,
};

const RECORD_RETENTION: usize = 1000;

pub const ABORT_AND_RETRY: &str = "abort-and-retry";

/// Resource demand of one contender and what the rest of the fleet already
/// holds.
#[derive(Debug, Clone, Default)]
pub struct CapacityContext {
    pub demands: HashMap<AgentId, (f64, u64)>,
    pub reserved_cpu: f64,
    pub reserved_memory: u64,
    pub limit: Option<LedgerCapacity>,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictContext {
    pub priorities: HashMap<AgentId, Priority>,
    pub capacity: Option<CapacityContext>,
}

impl ConflictContext {
    fn priority(&self, agent_id: &AgentId) -> Priority {
        self.priorities.get(agent_id).copied().unwrap_or_default()
    }
}

/// Resolves conflicts and keeps the resolved records for audit.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    records: VecDeque<ConflictRecord>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        request: &ConflictRequest,
        context: &ConflictContext,
    ) -> FleetResult<ConflictRecord> {
        if request.agents.is_empty() {
            return Err(FleetError::EmptyConflict);
        }

        let mut record = ConflictRecord::open(request);
        let resolution = match request.conflict_type {
            ConflictType::ResourceContention => resolve_contention(&request.agents, context),
            ConflictType::Deadlock => ConflictResolution::AbortAndRetry {
                victim: request.agents[0],
                action: ABORT_AND_RETRY.to_string(),
            },
            ConflictType::PriorityConflict => ConflictResolution::ExecutionOrder {
                order: request.agents.clone(),
            },
        };
        record.close(resolution);

        log::info!(
            "Resolved {} conflict {} among {} agents using {}",
            record.conflict_type,
            record.id,
            record.agents.len(),
            record.strategy
        );

        if self.records.len() == RECORD_RETENTION {
            self.records.pop_front();
        }
        self.records.push_back(record.clone());
        Ok(record)
    }

    pub fn record(&self, id: &ConflictId) -> Option<&ConflictRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn resolve_contention(agents: &[AgentId], context: &ConflictContext) -> ConflictResolution {
    let mut ranked: Vec<AgentId> = agents.to_vec();
    ranked.sort_by_key(|id| std::cmp::Reverse(context.priority(id).rank()));

    let capacity = context
        .capacity
        .as_ref()
        .and_then(|c| c.limit.map(|limit| (c, limit)));

    let Some((capacity, limit)) = capacity else {
        let deferred = ranked.split_off(1);
        return ConflictResolution::Allocation {
            granted: ranked,
            deferred,
        };
    };

    let mut cpu = capacity.reserved_cpu;
    let mut memory = capacity.reserved_memory;
    let mut granted = Vec::new();
    let mut deferred = Vec::new();

    for agent_id in ranked {
        let (need_cpu, need_memory) = capacity.demands.get(&agent_id).copied().unwrap_or((0.0, 0));
        if limit.fits(cpu + need_cpu, memory + need_memory) {
            cpu += need_cpu;
            memory += need_memory;
            granted.push(agent_id);
        } else {
            deferred.push(agent_id);
        }
    }

    ConflictResolution::Allocation { granted, deferred }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn request(conflict_type: ConflictType, agents: Vec<AgentId>) -> ConflictRequest {
        ConflictRequest {
            conflict_type,
            agents,
            severity: Severity::High,
            allocation: None,
        }
    }

    #[test]
    fn test_contention_grants_highest_priority() {
        let mut resolver = ConflictResolver::new();
        let low = AgentId::new_v4();
        let critical = AgentId::new_v4();
        let context = ConflictContext {
            priorities: HashMap::from([(low, Priority::Low), (critical, Priority::Critical)]),
            capacity: None,
        };

        let record = resolver
            .resolve(&request(ConflictType::ResourceContention, vec![low, critical]), &context)
            .unwrap();

        assert!(record.resolved);
        assert_eq!(record.strategy, "priority-based-allocation");
        assert_eq!(
            record.resolution,
            Some(ConflictResolution::Allocation {
                granted: vec![critical],
                deferred: vec![low],
            })
        );
    }

    #[test]
    fn test_contention_ties_keep_input_order() {
        let mut resolver = ConflictResolver::new();
        let first = AgentId::new_v4();
        let second = AgentId::new_v4();

        let record = resolver
            .resolve(
                &request(ConflictType::ResourceContention, vec![first, second]),
                &ConflictContext::default(),
            )
            .unwrap();

        assert_eq!(
            record.resolution,
            Some(ConflictResolution::Allocation {
                granted: vec![first],
                deferred: vec![second],
            })
        );
    }

    #[test]
    fn test_contention_with_capacity_grants_what_fits() {
        let mut resolver = ConflictResolver::new();
        let (a, b, c) = (AgentId::new_v4(), AgentId::new_v4(), AgentId::new_v4());
        let context = ConflictContext {
            priorities: HashMap::from([
                (a, Priority::High),
                (b, Priority::Medium),
                (c, Priority::Low),
            ]),
            capacity: Some(CapacityContext {
                demands: HashMap::from([(a, (1.0, 512)), (b, (1.5, 512)), (c, (0.5, 512))]),
                reserved_cpu: 0.0,
                reserved_memory: 0,
                limit: Some(LedgerCapacity {
                    max_cpu: 2.0,
                    max_memory: 4096,
                }),
            }),
        };

        let record = resolver
            .resolve(&request(ConflictType::ResourceContention, vec![c, b, a]), &context)
            .unwrap();

        assert_eq!(
            record.resolution,
            Some(ConflictResolution::Allocation {
                granted: vec![a, c],
                deferred: vec![b],
            })
        );
    }

    #[test]
    fn test_deadlock_picks_first_agent() {
        let mut resolver = ConflictResolver::new();
        let agents = vec![AgentId::new_v4(), AgentId::new_v4()];

        let record = resolver
            .resolve(&request(ConflictType::Deadlock, agents.clone()), &ConflictContext::default())
            .unwrap();

        assert_eq!(
            record.resolution,
            Some(ConflictResolution::AbortAndRetry {
                victim: agents[0],
                action: ABORT_AND_RETRY.to_string(),
            })
        );
    }

    #[test]
    fn test_priority_conflict_preserves_order() {
        let mut resolver = ConflictResolver::new();
        let agents = vec![AgentId::new_v4(), AgentId::new_v4(), AgentId::new_v4()];

        let record = resolver
            .resolve(
                &request(ConflictType::PriorityConflict, agents.clone()),
                &ConflictContext::default(),
            )
            .unwrap();

        assert_eq!(
            record.resolution,
            Some(ConflictResolution::ExecutionOrder { order: agents })
        );
        assert_eq!(resolver.record(&record.id), Some(&record));
    }

    #[test]
    fn test_empty_conflict_rejected() {
        let mut resolver = ConflictResolver::new();
        let result = resolver.resolve(
            &request(ConflictType::Deadlock, Vec::new()),
            &ConflictContext::default(),
        );
        assert!(matches!(result, Err(FleetError::EmptyConflict)));
        assert!(resolver.is_empty());
    }
}
