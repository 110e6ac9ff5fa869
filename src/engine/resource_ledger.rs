use std::collections::HashMap;

use crate::config::ResourceLimits;
use crate::types::{parse_memory_mb, AgentId, ResourceAllocation};

/// Aggregate limits derived from `maxConcurrent × per-agent` limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerCapacity {
    pub max_cpu: f64,
    /// Megabytes.
    pub max_memory: u64,
}

impl LedgerCapacity {
    pub fn from_limits(limits: &ResourceLimits) -> Self {
        Self {
            max_cpu: limits.max_concurrent as f64 * limits.cpu_per_agent,
            max_memory: limits.max_concurrent as u64 * parse_memory_mb(&limits.memory_per_agent),
        }
    }

    pub fn fits(&self, cpu: f64, memory: u64) -> bool {
        cpu <= self.max_cpu + f64::EPSILON && memory <= self.max_memory
    }
}

#[derive(Debug)]
pub struct ResourceLedger {
    allocations: HashMap<AgentId, ResourceAllocation>,
    capacity: LedgerCapacity,
}

impl ResourceLedger {
    pub fn new(capacity: LedgerCapacity) -> Self {
        Self {
            allocations: HashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> LedgerCapacity {
        self.capacity
    }

    pub fn allocation(&self, agent_id: &AgentId) -> Option<&ResourceAllocation> {
        self.allocations.get(agent_id)
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn holders(&self) -> Vec<AgentId> {
        self.snapshot().into_iter().map(|a| a.agent_id).collect()
    }

    /// Committed (cpu, memory MB) excluding `except`.
    pub fn totals_except(&self, except: Option<&AgentId>) -> (f64, u64) {
        self.allocations
            .values()
            .filter(|a| Some(&a.agent_id) != except)
            .fold((0.0, 0), |(cpu, memory), a| (cpu + a.cpu, memory + a.memory))
    }

    /// Whether committing `candidate` would push either aggregate past its
    /// limit. An existing allocation for the same agent is replaced, not added.
    pub fn detect_conflict(&self, candidate: &ResourceAllocation) -> bool {
        let (cpu, memory) = self.totals_except(Some(&candidate.agent_id));
        !self
            .capacity
            .fits(cpu + candidate.cpu, memory + candidate.memory)
    }

    pub fn commit(&mut self, allocation: ResourceAllocation) -> Option<ResourceAllocation> {
        self.allocations.insert(allocation.agent_id, allocation)
    }

    pub fn release(&mut self, agent_id: &AgentId) -> Option<ResourceAllocation> {
        self.allocations.remove(agent_id)
    }

    /// Allocations in commit order.
    pub fn snapshot(&self) -> Vec<ResourceAllocation> {
        let mut allocations: Vec<ResourceAllocation> = self.allocations.values().cloned().collect();
        allocations.sort_by_key(|a| (a.allocated, a.agent_id));
        allocations
    }

    pub fn restore(&mut self, allocations: Vec<ResourceAllocation>) {
        self.allocations = allocations
            .into_iter()
            .map(|a| (a.agent_id, a))
            .collect();
    }
}
