use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::config::PoolConfig;
use crate::error::{FleetError, FleetResult};
use crate::lifecycle::{AgentStateMachine, LifecycleEvent};
use crate::types::{AgentId, AgentPool, AgentRecord, AgentSpawnConfig, AgentStatus, QueuedTask};

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnConfirmation {
    /// A pending intent was confirmed.
    Confirmed(AgentRecord),
    /// An agent nobody asked for was taken into its pool.
    Adopted(AgentRecord),
    /// The agent was already confirmed or has failed; nothing changed.
    Duplicate(AgentRecord),
    /// An unrequested agent arrived with no room for it.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskPlacement {
    Assigned(AgentId),
    Queued { position: usize },
}

/// Per-type capacity counters plus the per-agent records and workload queue
/// behind them.
#[derive(Debug)]
pub struct PoolRegistry {
    pools: BTreeMap<String, AgentPool>,
    agents: HashMap<AgentId, AgentRecord>,
    queue: VecDeque<QueuedTask>,
    max_agents: usize,
    tasks_completed: u64,
    tasks_failed: u64,
}

impl PoolRegistry {
    pub fn new(pools: &[PoolConfig], max_agents: usize) -> Self {
        Self {
            pools: pools
                .iter()
                .map(|p| (p.agent_type.clone(), AgentPool::from_config(p)))
                .collect(),
            agents: HashMap::new(),
            queue: VecDeque::new(),
            max_agents,
            tasks_completed: 0,
            tasks_failed: 0,
        }
    }

    pub fn pool(&self, agent_type: &str) -> Option<&AgentPool> {
        self.pools.get(agent_type)
    }

    pub fn pools(&self) -> impl Iterator<Item = &AgentPool> {
        self.pools.values()
    }

    pub fn pool_snapshot(&self) -> Vec<AgentPool> {
        self.pools.values().cloned().collect()
    }

    /// Replaces counters from a persisted snapshot. Pools that are no longer
    /// configured are skipped.
    pub fn restore_pools(&mut self, snapshot: Vec<AgentPool>) -> usize {
        let mut restored = 0;
        for mut pool in snapshot {
            match self.pools.get_mut(&pool.agent_type) {
                Some(current) => {
                    pool.min_size = current.min_size;
                    pool.max_size = current.max_size;
                    pool.priority = current.priority;
                    *current = pool;
                    restored += 1;
                }
                None => log::warn!(
                    "Ignoring persisted pool {} which is not configured",
                    pool.agent_type
                ),
            }
        }
        restored
    }

    /// Brings back persisted records of confirmed agents. Workload is not
    /// persisted, so every restored agent comes back idle. Counters are left
    /// as restored by `restore_pools`. Returns the ids that were taken in.
    pub fn restore_agents(&mut self, records: Vec<AgentRecord>, now: DateTime<Utc>) -> Vec<AgentId> {
        let mut restored = Vec::new();
        for mut record in records {
            if !self.pools.contains_key(&record.agent_type) {
                log::warn!(
                    "Ignoring persisted agent {} of unconfigured type {}",
                    record.agent_id,
                    record.agent_type
                );
                continue;
            }
            if matches!(record.status, AgentStatus::Pending | AgentStatus::Failed) {
                continue;
            }
            record.status = AgentStatus::Idle;
            record.current_task = None;
            record.terminating = false;
            record.confirmed_at.get_or_insert(now);
            restored.push(record.agent_id);
            self.agents.insert(record.agent_id, record);
        }
        restored
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<&AgentRecord> {
        self.agents.get(agent_id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values()
    }

    /// Live agents across every pool, counted by intent.
    pub fn fleet_total(&self) -> usize {
        self.pools.values().map(AgentPool::live_count).sum()
    }

    pub fn busy_total(&self) -> usize {
        self.pools.values().map(|p| p.busy).sum()
    }

    pub fn fleet_utilization(&self) -> f64 {
        let total = self.fleet_total();
        if total == 0 {
            0.0
        } else {
            self.busy_total() as f64 / total as f64
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed
    }

    pub fn set_task_counters(&mut self, completed: u64, failed: u64) {
        self.tasks_completed = completed;
        self.tasks_failed = failed;
    }

    /// Checks capacity and optimistically books `count` new agents of
    /// `agent_type`, returning one pending record per unit.
    pub fn reserve(
        &mut self,
        agent_type: &str,
        count: usize,
        config: AgentSpawnConfig,
    ) -> FleetResult<Vec<AgentRecord>> {
        let fleet_total = self.fleet_total();
        let pool = self
            .pools
            .get_mut(agent_type)
            .ok_or_else(|| FleetError::UnknownAgentType(agent_type.to_string()))?;

        if !pool.can_accept(count) {
            return Err(FleetError::PoolCapacityExceeded {
                agent_type: agent_type.to_string(),
                current: pool.live_count(),
                requested: count,
                limit: pool.max_size,
            });
        }
        if fleet_total + count > self.max_agents {
            return Err(FleetError::FleetCapacityExceeded {
                current: fleet_total,
                requested: count,
                limit: self.max_agents,
            });
        }

        pool.active += count;
        pool.refresh_utilization();
        let priority = pool.priority;

        let records: Vec<AgentRecord> = (0..count)
            .map(|_| AgentRecord::pending(agent_type.to_string(), priority, config.clone()))
            .collect();
        for record in &records {
            self.agents.insert(record.agent_id, record.clone());
        }

        Ok(records)
    }

    pub fn confirm(
        &mut self,
        agent_id: AgentId,
        agent_type: &str,
        default_config: &AgentSpawnConfig,
        now: DateTime<Utc>,
    ) -> FleetResult<SpawnConfirmation> {
        if let Some(record) = self.agents.get_mut(&agent_id) {
            if record.status != AgentStatus::Pending {
                return Ok(SpawnConfirmation::Duplicate(record.clone()));
            }
            if record.agent_type != agent_type {
                log::warn!(
                    "Agent {} reported type {} but was requested as {}",
                    agent_id,
                    agent_type,
                    record.agent_type
                );
            }

            AgentStateMachine::transition(record, LifecycleEvent::SpawnConfirmed)?;
            record.confirmed_at = Some(now);
            let confirmed = record.clone();

            if let Some(pool) = self.pools.get_mut(&confirmed.agent_type) {
                pool.idle += 1;
                pool.refresh_utilization();
            }
            return Ok(SpawnConfirmation::Confirmed(confirmed));
        }

        let fleet_total = self.fleet_total();
        let pool = self
            .pools
            .get_mut(agent_type)
            .ok_or_else(|| FleetError::UnknownAgentType(agent_type.to_string()))?;

        if !pool.can_accept(1) {
            return Ok(SpawnConfirmation::Rejected {
                reason: format!("pool {} is at maxSize {}", agent_type, pool.max_size),
            });
        }
        if fleet_total + 1 > self.max_agents {
            return Ok(SpawnConfirmation::Rejected {
                reason: format!("fleet is at maxAgents {}", self.max_agents),
            });
        }

        let mut record =
            AgentRecord::pending(agent_type.to_string(), pool.priority, default_config.clone());
        record.agent_id = agent_id;
        record.status = AgentStatus::Idle;
        record.confirmed_at = Some(now);

        pool.active += 1;
        pool.idle += 1;
        pool.refresh_utilization();

        self.agents.insert(agent_id, record.clone());
        Ok(SpawnConfirmation::Adopted(record))
    }

    pub fn mark_terminating(&mut self, agent_id: &AgentId) -> FleetResult<AgentRecord> {
        let record = self
            .agents
            .get_mut(agent_id)
            .ok_or(FleetError::UnknownAgent(*agent_id))?;
        record.terminating = true;
        Ok(record.clone())
    }

    /// Removes an agent that has actually gone away and gives its slot back.
    pub fn release(&mut self, agent_id: &AgentId) -> Option<AgentRecord> {
        let record = self.agents.remove(agent_id)?;
        self.release_counters(&record);
        Some(record)
    }

    /// Marks a live agent failed, frees its slot and bumps the pool's failure
    /// count. The record is kept so recovery can reuse its type and config.
    pub fn mark_failed(&mut self, agent_id: &AgentId) -> FleetResult<AgentRecord> {
        let record = self
            .agents
            .get_mut(agent_id)
            .ok_or(FleetError::UnknownAgent(*agent_id))?;
        if record.status == AgentStatus::Failed {
            return Ok(record.clone());
        }

        let before = record.clone();
        AgentStateMachine::transition(record, LifecycleEvent::Failure)?;
        record.current_task = None;
        let failed = record.clone();

        self.release_counters(&before);
        if let Some(pool) = self.pools.get_mut(&failed.agent_type) {
            pool.failed += 1;
        }
        Ok(failed)
    }

    /// Drops the record of a failed agent once it has been replaced.
    pub fn forget_failed(&mut self, agent_id: &AgentId) -> Option<AgentRecord> {
        match self.agents.get(agent_id) {
            Some(record) if record.status == AgentStatus::Failed => self.agents.remove(agent_id),
            _ => None,
        }
    }

    fn release_counters(&mut self, record: &AgentRecord) {
        let Some(pool) = self.pools.get_mut(&record.agent_type) else {
            return;
        };
        match record.status {
            AgentStatus::Pending => {
                pool.active = pool.active.saturating_sub(1);
            }
            AgentStatus::Idle => {
                pool.active = pool.active.saturating_sub(1);
                pool.idle = pool.idle.saturating_sub(1);
            }
            AgentStatus::Busy => {
                pool.busy = pool.busy.saturating_sub(1);
            }
            AgentStatus::Failed => {}
        }
        pool.refresh_utilization();

        if record.status == AgentStatus::Busy {
            if let Some(task_id) = &record.current_task {
                log::info!(
                    "Requeueing task {} from departed agent {}",
                    task_id,
                    record.agent_id
                );
                self.queue.push_front(QueuedTask::new(
                    task_id.clone(),
                    Some(record.agent_type.clone()),
                ));
            }
        }
    }

    pub fn submit_task(
        &mut self,
        task_id: String,
        agent_type: Option<String>,
    ) -> FleetResult<TaskPlacement> {
        if let Some(agent_type) = &agent_type {
            if !self.pools.contains_key(agent_type) {
                return Err(FleetError::UnknownAgentType(agent_type.clone()));
            }
        }

        let task = QueuedTask::new(task_id, agent_type);
        match self.find_idle_agent(&task) {
            Some(agent_id) => {
                self.assign(agent_id, task.task_id)?;
                Ok(TaskPlacement::Assigned(agent_id))
            }
            None => {
                self.queue.push_back(task);
                Ok(TaskPlacement::Queued {
                    position: self.queue.len() - 1,
                })
            }
        }
    }

    /// Frees a busy agent and hands it the next queued task it can take.
    /// Returns the id of that task, if any.
    pub fn complete_task(&mut self, agent_id: &AgentId, success: bool) -> FleetResult<Option<String>> {
        let record = self
            .agents
            .get_mut(agent_id)
            .ok_or(FleetError::UnknownAgent(*agent_id))?;
        AgentStateMachine::transition(record, LifecycleEvent::TaskFinished)?;
        record.current_task = None;
        let agent_type = record.agent_type.clone();
        let terminating = record.terminating;

        if let Some(pool) = self.pools.get_mut(&agent_type) {
            pool.busy = pool.busy.saturating_sub(1);
            pool.active += 1;
            pool.idle += 1;
            pool.refresh_utilization();
        }
        if success {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }

        if terminating {
            return Ok(None);
        }
        let Some(position) = self.queue.iter().position(|t| t.accepts(&agent_type)) else {
            return Ok(None);
        };
        let Some(task) = self.queue.remove(position) else {
            return Ok(None);
        };
        let task_id = task.task_id.clone();
        self.assign(*agent_id, task.task_id)?;
        Ok(Some(task_id))
    }

    /// Places as many queued tasks as idle agents allow, in queue order.
    pub fn rebalance(&mut self) -> FleetResult<Vec<(String, AgentId)>> {
        let mut assigned = Vec::new();
        let mut remaining = VecDeque::new();

        while let Some(task) = self.queue.pop_front() {
            match self.find_idle_agent(&task) {
                Some(agent_id) => {
                    let task_id = task.task_id.clone();
                    self.assign(agent_id, task.task_id)?;
                    assigned.push((task_id, agent_id));
                }
                None => remaining.push_back(task),
            }
        }

        self.queue = remaining;
        Ok(assigned)
    }

    fn find_idle_agent(&self, task: &QueuedTask) -> Option<AgentId> {
        self.agents
            .values()
            .filter(|r| r.status == AgentStatus::Idle && !r.terminating && task.accepts(&r.agent_type))
            .min_by_key(|r| (r.confirmed_at, r.agent_id))
            .map(|r| r.agent_id)
    }

    fn assign(&mut self, agent_id: AgentId, task_id: String) -> FleetResult<()> {
        let record = self
            .agents
            .get_mut(&agent_id)
            .ok_or(FleetError::UnknownAgent(agent_id))?;
        AgentStateMachine::transition(record, LifecycleEvent::TaskAssigned)?;
        record.current_task = Some(task_id);

        if let Some(pool) = self.pools.get_mut(&record.agent_type) {
            pool.active = pool.active.saturating_sub(1);
            pool.idle = pool.idle.saturating_sub(1);
            pool.busy += 1;
            pool.refresh_utilization();
        }
        Ok(())
    }

    /// Agents to terminate when shrinking a pool: newest idle agents first,
    /// then unconfirmed ones. Busy agents are never chosen.
    pub fn scale_down_candidates(&self, agent_type: &str, count: usize) -> Vec<AgentId> {
        let mut idle: Vec<&AgentRecord> = self
            .agents
            .values()
            .filter(|r| r.agent_type == agent_type && !r.terminating)
            .filter(|r| r.status == AgentStatus::Idle)
            .collect();
        idle.sort_by_key(|r| std::cmp::Reverse((r.confirmed_at, r.agent_id)));

        let mut pending: Vec<&AgentRecord> = self
            .agents
            .values()
            .filter(|r| r.agent_type == agent_type && !r.terminating)
            .filter(|r| r.status == AgentStatus::Pending)
            .collect();
        pending.sort_by_key(|r| std::cmp::Reverse((r.spawned_at, r.agent_id)));

        idle.into_iter()
            .chain(pending)
            .take(count)
            .map(|r| r.agent_id)
            .collect()
    }

    /// Drops a pending record without a terminated event, e.g. when
    /// reconciliation decides the spawn was lost.
    pub fn drop_pending(&mut self, agent_id: &AgentId) -> Option<AgentRecord> {
        match self.agents.get(agent_id) {
            Some(record) if record.status == AgentStatus::Pending => self.release(agent_id),
            _ => None,
        }
    }

    pub(crate) fn pool_mut(&mut self, agent_type: &str) -> Option<&mut AgentPool> {
        self.pools.get_mut(agent_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    fn create_test_registry() -> PoolRegistry {
        PoolRegistry::new(
            &[
                PoolConfig {
                    agent_type: "executor".to_string(),
                    min_size: 3,
                    max_size: 15,
                    priority: Priority::Critical,
                },
                PoolConfig {
                    agent_type: "analyzer".to_string(),
                    min_size: 0,
                    max_size: 5,
                    priority: Priority::Low,
                },
            ],
            50,
        )
    }

    fn confirmed_agent(registry: &mut PoolRegistry, agent_type: &str) -> AgentId {
        let record = registry
            .reserve(agent_type, 1, AgentSpawnConfig::default())
            .unwrap()
            .remove(0);
        registry
            .confirm(record.agent_id, agent_type, &AgentSpawnConfig::default(), Utc::now())
            .unwrap();
        record.agent_id
    }

    #[test]
    fn test_reserve_increments_active() {
        let mut registry = create_test_registry();
        registry.reserve("executor", 3, AgentSpawnConfig::default()).unwrap();

        let records = registry
            .reserve("executor", 5, AgentSpawnConfig::default())
            .unwrap();

        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.priority == Priority::Critical));
        assert_eq!(registry.pool("executor").unwrap().active, 8);
        assert_eq!(registry.pool("executor").unwrap().idle, 0);
    }

    #[test]
    fn test_reserve_rejects_pool_overflow() {
        let mut registry = create_test_registry();
        registry.reserve("executor", 3, AgentSpawnConfig::default()).unwrap();

        let err = registry
            .reserve("executor", 13, AgentSpawnConfig::default())
            .unwrap_err();

        assert!(matches!(
            err,
            FleetError::PoolCapacityExceeded {
                current: 3,
                requested: 13,
                limit: 15,
                ..
            }
        ));
        assert_eq!(registry.pool("executor").unwrap().active, 3);
    }

    #[test]
    fn test_reserve_rejects_unknown_type() {
        let mut registry = create_test_registry();
        let err = registry
            .reserve("painter", 1, AgentSpawnConfig::default())
            .unwrap_err();
        assert!(matches!(err, FleetError::UnknownAgentType(ref t) if t == "painter"));
    }

    #[test]
    fn test_reserve_rejects_fleet_overflow() {
        let mut registry = PoolRegistry::new(
            &[PoolConfig {
                agent_type: "executor".to_string(),
                min_size: 0,
                max_size: 10,
                priority: Priority::Medium,
            }],
            4,
        );

        registry.reserve("executor", 4, AgentSpawnConfig::default()).unwrap();
        let err = registry
            .reserve("executor", 1, AgentSpawnConfig::default())
            .unwrap_err();

        assert!(matches!(err, FleetError::FleetCapacityExceeded { limit: 4, .. }));
    }

    #[test]
    fn test_confirm_pending_agent() {
        let mut registry = create_test_registry();
        let agent_id = confirmed_agent(&mut registry, "executor");

        let pool = registry.pool("executor").unwrap();
        assert_eq!(pool.active, 1);
        assert_eq!(pool.idle, 1);
        assert_eq!(registry.agent(&agent_id).unwrap().status, AgentStatus::Idle);
    }

    #[test]
    fn test_confirm_twice_is_duplicate() {
        let mut registry = create_test_registry();
        let agent_id = confirmed_agent(&mut registry, "executor");

        let outcome = registry
            .confirm(agent_id, "executor", &AgentSpawnConfig::default(), Utc::now())
            .unwrap();

        assert!(matches!(outcome, SpawnConfirmation::Duplicate(_)));
        assert_eq!(registry.pool("executor").unwrap().idle, 1);
    }

    #[test]
    fn test_confirm_adopts_unrequested_agent() {
        let mut registry = create_test_registry();
        let agent_id = AgentId::new_v4();

        let outcome = registry
            .confirm(agent_id, "analyzer", &AgentSpawnConfig::default(), Utc::now())
            .unwrap();

        assert!(matches!(outcome, SpawnConfirmation::Adopted(_)));
        assert_eq!(registry.pool("analyzer").unwrap().active, 1);
    }

    #[test]
    fn test_confirm_rejects_when_full() {
        let mut registry = create_test_registry();
        registry.reserve("analyzer", 5, AgentSpawnConfig::default()).unwrap();

        let outcome = registry
            .confirm(AgentId::new_v4(), "analyzer", &AgentSpawnConfig::default(), Utc::now())
            .unwrap();

        assert!(matches!(outcome, SpawnConfirmation::Rejected { .. }));
    }

    #[test]
    fn test_release_by_status() {
        let mut registry = create_test_registry();
        let pending = registry
            .reserve("executor", 1, AgentSpawnConfig::default())
            .unwrap()[0]
            .agent_id;
        let idle = confirmed_agent(&mut registry, "executor");

        registry.release(&pending);
        registry.release(&idle);

        let pool = registry.pool("executor").unwrap();
        assert_eq!(pool.active, 0);
        assert_eq!(pool.idle, 0);
        assert!(registry.release(&idle).is_none());
    }

    #[test]
    fn test_task_assignment_and_completion() {
        let mut registry = create_test_registry();
        let agent_id = confirmed_agent(&mut registry, "executor");

        let placement = registry
            .submit_task("t-1".to_string(), Some("executor".to_string()))
            .unwrap();
        assert_eq!(placement, TaskPlacement::Assigned(agent_id));

        let pool = registry.pool("executor").unwrap();
        assert_eq!((pool.active, pool.idle, pool.busy), (0, 0, 1));
        assert_eq!(pool.utilization, 1.0);

        let queued = registry.submit_task("t-2".to_string(), None).unwrap();
        assert_eq!(queued, TaskPlacement::Queued { position: 0 });

        let next = registry.complete_task(&agent_id, true).unwrap();
        assert_eq!(next.as_deref(), Some("t-2"));
        assert_eq!(registry.tasks_completed(), 1);
        assert_eq!(registry.queue_len(), 0);
        assert_eq!(registry.pool("executor").unwrap().busy, 1);
    }

    #[test]
    fn test_task_for_unknown_type_rejected() {
        let mut registry = create_test_registry();
        assert!(registry
            .submit_task("t-1".to_string(), Some("painter".to_string()))
            .is_err());
    }

    #[test]
    fn test_mark_failed_requeues_task() {
        let mut registry = create_test_registry();
        let agent_id = confirmed_agent(&mut registry, "executor");
        registry.submit_task("t-1".to_string(), None).unwrap();

        let failed = registry.mark_failed(&agent_id).unwrap();
        assert_eq!(failed.status, AgentStatus::Failed);

        let pool = registry.pool("executor").unwrap();
        assert_eq!(pool.busy, 0);
        assert_eq!(pool.failed, 1);
        assert_eq!(registry.queue_len(), 1);

        registry.mark_failed(&agent_id).unwrap();
        assert_eq!(registry.pool("executor").unwrap().failed, 1);
    }

    #[test]
    fn test_rebalance_places_queued_tasks() {
        let mut registry = create_test_registry();
        registry.submit_task("t-1".to_string(), Some("analyzer".to_string())).unwrap();
        registry.submit_task("t-2".to_string(), Some("executor".to_string())).unwrap();
        let executor = confirmed_agent(&mut registry, "executor");

        let assigned = registry.rebalance().unwrap();

        assert_eq!(assigned, vec![("t-2".to_string(), executor)]);
        assert_eq!(registry.queue_len(), 1);
    }

    #[test]
    fn test_scale_down_candidates_skip_busy() {
        let mut registry = create_test_registry();
        let busy = confirmed_agent(&mut registry, "executor");
        registry.submit_task("t-1".to_string(), None).unwrap();
        let idle = confirmed_agent(&mut registry, "executor");
        let pending = registry
            .reserve("executor", 1, AgentSpawnConfig::default())
            .unwrap()[0]
            .agent_id;

        let candidates = registry.scale_down_candidates("executor", 5);

        assert_eq!(candidates, vec![idle, pending]);
        assert!(!candidates.contains(&busy));
    }

    #[test]
    fn test_restore_pools_keeps_configured_limits() {
        let mut registry = create_test_registry();
        let mut snapshot = registry.pool_snapshot();
        snapshot[1].active = 4;
        snapshot[1].max_size = 99;

        let restored = registry.restore_pools(snapshot);

        assert_eq!(restored, 2);
        let executor = registry.pool("executor").unwrap();
        assert_eq!(executor.active, 4);
        assert_eq!(executor.max_size, 15);
    }

    #[test]
    fn test_restore_agents_comes_back_idle() {
        let mut source = create_test_registry();
        let idle = confirmed_agent(&mut source, "executor");
        let busy = confirmed_agent(&mut source, "executor");
        source.submit_task("t-1".to_string(), None).unwrap();
        let pending = source
            .reserve("analyzer", 1, AgentSpawnConfig::default())
            .unwrap()
            .remove(0);
        let mut stray = source.agent(&idle).unwrap().clone();
        stray.agent_id = AgentId::new_v4();
        stray.agent_type = "reviewer".to_string();
        let records = vec![
            source.agent(&idle).unwrap().clone(),
            source.agent(&busy).unwrap().clone(),
            pending,
            stray,
        ];

        let mut registry = create_test_registry();
        let restored = registry.restore_agents(records, Utc::now());

        assert_eq!(restored, vec![idle, busy]);
        for agent_id in &restored {
            let record = registry.agent(agent_id).unwrap();
            assert_eq!(record.status, AgentStatus::Idle);
            assert!(record.current_task.is_none());
        }
        assert_eq!(registry.agents().count(), 2);
    }
}
