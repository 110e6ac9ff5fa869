use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::autoscaler::{self, AutoScaler, ScalingHistory};
use super::conflict::{CapacityContext, ConflictContext, ConflictResolver};
use super::heartbeat;
use super::metrics;
use super::outcomes::{
    AutoscaleOutcome, InitializeResult, RebalanceResult, RecoveryResult, RestoreReport,
    ScaleResult, SpawnResult, StatusReport, TaskAssignment, TerminateResult, TopologyChangeResult,
};
use super::pool_registry::{PoolRegistry, SpawnConfirmation, TaskPlacement};
use super::reconcile::{self, ReconciliationReport};
use super::resource_ledger::{LedgerCapacity, ResourceLedger};
use super::topology::TopologyManager;
use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::events::{EventBus, EventBusError, FleetEvent};
use crate::lifecycle::HeartbeatTracker;
use crate::resilience::{
    ArticulationPointAnalyzer, Optimization, ResilienceAnalyzer, ResilienceReport, SpofResult,
};
use crate::storage::{keys, InMemoryStore, KeyValueStore};
use crate::types::{
    parse_memory_mb, AgentId, AgentPool, AgentRecord, AgentSpawnConfig, ConflictRecord,
    ConflictRequest, ConflictResolution, ConflictType, FleetGraph, FleetMetrics, FleetStatus,
    GraphNode, ResourceAllocation, ScalingAction, Severity, TopologyMode, TopologyState,
};

const CONTENTION_REASON: &str = "resource-contention";

/// A resolved conflict whose ledger effects are already applied. The victims
/// still need their terminate intents.
struct AppliedResolution {
    record: ConflictRecord,
    victims: Vec<AgentId>,
    reason: String,
}

/// Owns every fleet aggregate and the loops that drive them.
///
/// Locks are always taken in the order pools, ledger, topology, conflicts,
/// history, heartbeats, and never held across an await.
#[derive(Clone)]
pub struct FleetCoordinator {
    config: Arc<FleetConfig>,
    store: Arc<dyn KeyValueStore>,
    analyzer: Arc<dyn ResilienceAnalyzer>,
    bus: EventBus,
    pools: Arc<Mutex<PoolRegistry>>,
    ledger: Arc<Mutex<ResourceLedger>>,
    topology: Arc<Mutex<TopologyManager>>,
    conflicts: Arc<Mutex<ConflictResolver>>,
    history: Arc<Mutex<ScalingHistory>>,
    heartbeats: Arc<Mutex<HeartbeatTracker>>,
    autoscaler: AutoScaler,
    status: Arc<watch::Sender<FleetStatus>>,
    pool_signal: Arc<Notify>,
    started_at: DateTime<Utc>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl FleetCoordinator {
    pub fn new(
        config: FleetConfig,
        store: Arc<dyn KeyValueStore>,
        analyzer: Arc<dyn ResilienceAnalyzer>,
    ) -> FleetResult<Self> {
        config.validate()?;

        let (status, _) = watch::channel(FleetStatus::Initializing);
        Ok(Self {
            bus: EventBus::new(config.event_capacity),
            pools: Arc::new(Mutex::new(PoolRegistry::new(&config.pools, config.max_agents))),
            ledger: Arc::new(Mutex::new(ResourceLedger::new(LedgerCapacity::from_limits(
                &config.resources,
            )))),
            topology: Arc::new(Mutex::new(TopologyManager::new(config.topology))),
            conflicts: Arc::new(Mutex::new(ConflictResolver::new())),
            history: Arc::new(Mutex::new(ScalingHistory::new(config.history_limit))),
            heartbeats: Arc::new(Mutex::new(HeartbeatTracker::new())),
            autoscaler: AutoScaler::new(config.autoscaling.clone()),
            status: Arc::new(status),
            pool_signal: Arc::new(Notify::new()),
            started_at: Utc::now(),
            workers: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(config),
            store,
            analyzer,
        })
    }

    /// In-memory store and the articulation-point analyzer.
    pub fn with_defaults(config: FleetConfig) -> FleetResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(ArticulationPointAnalyzer::new()),
        )
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn fleet_status(&self) -> FleetStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FleetStatus> {
        self.status.subscribe()
    }

    pub(crate) fn pool_changed(&self) -> Notified<'_> {
        self.pool_signal.notified()
    }

    fn set_status(&self, status: FleetStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            log::info!("Fleet {} status {} -> {}", self.config.fleet_id, previous, status);
        }
    }

    fn signal_pool_change(&self, agent_type: &str) {
        self.pool_signal.notify_one();
        self.bus.publish(FleetEvent::PoolChanged {
            agent_type: agent_type.to_string(),
        });
    }

    pub fn pool(&self, agent_type: &str) -> Option<AgentPool> {
        self.pools.lock().pool(agent_type).cloned()
    }

    pub fn pools(&self) -> Vec<AgentPool> {
        self.pools.lock().pool_snapshot()
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<AgentRecord> {
        self.pools.lock().agent(agent_id).cloned()
    }

    pub fn allocation(&self, agent_id: &AgentId) -> Option<ResourceAllocation> {
        self.ledger.lock().allocation(agent_id).cloned()
    }

    pub fn allocations(&self) -> Vec<ResourceAllocation> {
        self.ledger.lock().snapshot()
    }

    pub fn topology_state(&self) -> TopologyState {
        self.topology.lock().state().clone()
    }

    pub fn last_analysis(&self) -> Option<ResilienceReport> {
        self.topology.lock().last_analysis().cloned()
    }

    pub fn conflict(&self, id: &crate::types::ConflictId) -> Option<ConflictRecord> {
        self.conflicts.lock().record(id).cloned()
    }

    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.conflicts.lock().records().cloned().collect()
    }

    pub fn scaling_history(&self) -> Vec<crate::types::ScalingDecision> {
        self.history.lock().decisions().cloned().collect()
    }

    pub fn tracked_heartbeats(&self) -> usize {
        self.heartbeats.lock().len()
    }

    pub fn metrics(&self) -> FleetMetrics {
        let pools = self.pools.lock();
        metrics::aggregate(&pools, self.started_at, Utc::now())
    }

    pub fn reconcile(&self, apply: bool) -> ReconciliationReport {
        let timeout = self.config.heartbeat.spawn_confirm_timeout();
        let report = {
            let mut pools = self.pools.lock();
            reconcile::reconcile(&mut pools, Utc::now(), timeout, apply)
        };
        for agent_id in &report.dropped_agents {
            self.bus.publish(FleetEvent::TerminateRequested {
                agent_id: *agent_id,
                reason: "spawn-timeout".to_string(),
            });
        }
        if apply {
            self.refresh_topology();
        }
        report
    }

    pub fn status(&self) -> StatusReport {
        let reconciliation = self.reconcile(false);
        let (pools, metrics) = {
            let pools = self.pools.lock();
            (
                pools.pool_snapshot(),
                metrics::aggregate(&pools, self.started_at, Utc::now()),
            )
        };
        let (topology, effective_mode, resilience) = {
            let topology = self.topology.lock();
            (
                topology.state().clone(),
                topology.effective_mode(),
                topology.last_analysis().cloned(),
            )
        };
        let conflicts_resolved = self.conflicts.lock().records().filter(|r| r.resolved).count();
        let recent_scaling = self.history.lock().recent(10);

        StatusReport {
            fleet_id: self.config.fleet_id.clone(),
            status: self.fleet_status(),
            pools,
            topology,
            effective_mode,
            metrics,
            resilience,
            recent_scaling,
            conflicts_resolved,
            reconciliation,
            uptime_seconds: Utc::now().signed_duration_since(self.started_at).num_seconds(),
        }
    }

    /// Brings every pool up to its minimum and activates the fleet. Safe to
    /// call again: only the remaining deficit is spawned.
    pub async fn initialize(&self) -> FleetResult<InitializeResult> {
        log::info!(
            "Initializing fleet {} ({} pools, maxAgents {})",
            self.config.fleet_id,
            self.config.pools.len(),
            self.config.max_agents
        );

        let deficits: Vec<(String, usize)> = {
            let pools = self.pools.lock();
            pools
                .pools()
                .filter(|p| p.live_count() < p.min_size)
                .map(|p| (p.agent_type.clone(), p.min_size - p.live_count()))
                .collect()
        };

        let mut spawned = Vec::new();
        for (agent_type, deficit) in deficits {
            spawned.push(self.spawn(&agent_type, deficit, None).await?);
        }

        self.refresh_topology();
        let topology = self.topology_state();
        self.persist_json(keys::TOPOLOGY, &topology).await;
        self.set_status(FleetStatus::Active);

        Ok(InitializeResult { spawned, topology })
    }

    /// Launches the autoscaler, heartbeat monitor and inbound event pump.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if self.config.autoscaling.enabled {
            workers.push(tokio::spawn(autoscaler::run(self.clone())));
        }
        workers.push(tokio::spawn(heartbeat::run(self.clone())));
        workers.push(tokio::spawn(run_event_pump(self.clone())));
    }

    /// Stops scheduling new loop iterations, waits for the loops to wind
    /// down and persists final state.
    pub async fn shutdown(&self) {
        self.set_status(FleetStatus::ShuttingDown);
        self.pool_signal.notify_waiters();

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                log::warn!("Background loop ended abnormally: {}", e);
            }
        }

        self.persist_state().await;
        self.set_status(FleetStatus::Stopped);
    }

    pub async fn spawn(
        &self,
        agent_type: &str,
        count: usize,
        config: Option<AgentSpawnConfig>,
    ) -> FleetResult<SpawnResult> {
        let config = config.unwrap_or_else(|| self.config.default_agent.clone());
        let reserved = self.pools.lock().reserve(agent_type, count, config);
        let records = match reserved {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Rejected spawn of {} {} agents: {}", count, agent_type, e);
                return Err(e);
            }
        };

        let priority = self.pool(agent_type).map(|p| p.priority).unwrap_or_default();
        for record in &records {
            self.bus.publish(FleetEvent::SpawnRequested {
                agent_id: record.agent_id,
                agent_type: record.agent_type.clone(),
                priority: record.priority,
                config: record.config.clone(),
            });
        }
        log::info!("Requested {} {} agents", records.len(), agent_type);

        if !records.is_empty() {
            self.signal_pool_change(agent_type);
            self.persist_pools().await;
        }

        Ok(SpawnResult {
            agent_type: agent_type.to_string(),
            priority,
            agent_ids: records.into_iter().map(|r| r.agent_id).collect(),
        })
    }

    /// Issues a terminate intent. Pool counters follow when the terminated
    /// event arrives.
    pub async fn terminate(&self, agent_id: AgentId, reason: &str) -> FleetResult<TerminateResult> {
        let marked = self.pools.lock().mark_terminating(&agent_id);
        if let Err(e) = marked {
            log::warn!("Cannot terminate agent {}: {}", agent_id, e);
            return Err(e);
        }
        let released = self.ledger.lock().release(&agent_id);

        self.bus.publish(FleetEvent::TerminateRequested {
            agent_id,
            reason: reason.to_string(),
        });
        log::info!("Requested termination of agent {} ({})", agent_id, reason);

        if released.is_some() {
            self.refresh_topology();
            self.persist_allocations().await;
        }

        Ok(TerminateResult {
            agent_id,
            released_allocation: released.is_some(),
        })
    }

    pub async fn handle_event(&self, event: FleetEvent) -> FleetResult<()> {
        match event {
            FleetEvent::AgentSpawned {
                agent_id,
                agent_type,
                capabilities,
            } => self.on_agent_spawned(agent_id, &agent_type, capabilities).await,
            FleetEvent::AgentTerminated { agent_id, reason } => {
                self.on_agent_terminated(agent_id, reason).await;
                Ok(())
            }
            FleetEvent::AgentError {
                agent_id,
                error,
                context,
            } => self.on_agent_error(agent_id, &error, context).await,
            FleetEvent::AgentHeartbeat { agent_id } => {
                if !self.record_heartbeat(agent_id) {
                    log::debug!("Heartbeat from untracked agent {}", agent_id);
                }
                Ok(())
            }
            FleetEvent::TaskSubmitted {
                task_id,
                agent_type,
            } => self.submit_task(task_id, agent_type).map(|_| ()),
            FleetEvent::TaskCompleted {
                task_id,
                agent_id,
                success,
            } => self.complete_task(&task_id, agent_id, success).map(|_| ()),
            other => {
                log::debug!("Ignoring outbound event {}", other.name());
                Ok(())
            }
        }
    }

    async fn on_agent_spawned(
        &self,
        agent_id: AgentId,
        agent_type: &str,
        capabilities: Vec<String>,
    ) -> FleetResult<()> {
        let now = Utc::now();
        let outcome =
            self.pools
                .lock()
                .confirm(agent_id, agent_type, &self.config.default_agent, now)?;

        let record = match outcome {
            SpawnConfirmation::Confirmed(record) => record,
            SpawnConfirmation::Adopted(record) => {
                log::info!("Adopted unrequested {} agent {}", agent_type, agent_id);
                record
            }
            SpawnConfirmation::Duplicate(_) => {
                log::debug!("Duplicate spawn confirmation for agent {}", agent_id);
                return Ok(());
            }
            SpawnConfirmation::Rejected { reason } => {
                log::warn!("Rejecting unrequested agent {}: {}", agent_id, reason);
                self.bus
                    .publish(FleetEvent::TerminateRequested { agent_id, reason });
                return Ok(());
            }
        };
        if !capabilities.is_empty() {
            log::debug!("Agent {} reports capabilities {:?}", agent_id, capabilities);
        }

        let candidate = ResourceAllocation::new(
            agent_id,
            record.config.cpu,
            parse_memory_mb(&record.config.memory),
            record.priority,
        );
        self.allocate(candidate).await?;

        self.heartbeats.lock().track(agent_id, now);
        let assigned = self.pools.lock().rebalance()?;
        for (task_id, agent) in &assigned {
            log::info!("Assigned queued task {} to agent {}", task_id, agent);
        }

        self.refresh_topology();
        self.signal_pool_change(&record.agent_type);
        self.persist_json(&keys::agent(&agent_id), &record).await;
        self.persist_pools().await;
        Ok(())
    }

    /// Commits an allocation, resolving contention first if it would not fit.
    /// Detection, resolution and the commit share one critical section so
    /// concurrent confirmations cannot both grant against the same snapshot.
    async fn allocate(&self, candidate: ResourceAllocation) -> FleetResult<()> {
        let candidate_id = candidate.agent_id;
        let applied = {
            let pools = self.pools.lock();
            let mut ledger = self.ledger.lock();
            if !ledger.detect_conflict(&candidate) {
                ledger.commit(candidate);
                None
            } else {
                log::warn!(
                    "Allocation for agent {} exceeds fleet resource limits",
                    candidate_id
                );
                let mut agents: Vec<AgentId> = ledger
                    .holders()
                    .into_iter()
                    .filter(|id| *id != candidate_id)
                    .collect();
                agents.push(candidate_id);
                let request = ConflictRequest {
                    conflict_type: ConflictType::ResourceContention,
                    agents,
                    severity: Severity::High,
                    allocation: Some(candidate),
                };
                Some(self.resolve_locked(&pools, &mut ledger, &request)?)
            }
        };

        match applied {
            None => {
                self.persist_allocations().await;
                Ok(())
            }
            Some(applied) => self.finish_resolution(applied).await.map(|_| ()),
        }
    }

    async fn on_agent_terminated(&self, agent_id: AgentId, reason: Option<String>) {
        let (record, allocation) = {
            let mut pools = self.pools.lock();
            let record = pools.release(&agent_id);
            (record, self.ledger.lock().release(&agent_id))
        };
        self.heartbeats.lock().untrack(&agent_id);

        let Some(record) = record else {
            log::debug!("Terminated event for unknown agent {}", agent_id);
            if allocation.is_some() {
                self.refresh_topology();
                self.persist_allocations().await;
            }
            return;
        };

        log::info!(
            "Agent {} ({}) terminated: {}",
            agent_id,
            record.agent_type,
            reason.as_deref().unwrap_or("no reason given")
        );

        self.refresh_topology();
        self.signal_pool_change(&record.agent_type);
        if let Err(e) = self.store.delete(&keys::agent(&agent_id)).await {
            log::warn!("Failed to delete {}: {}", keys::agent(&agent_id), e);
        }
        self.persist_pools().await;
        self.persist_allocations().await;
    }

    async fn on_agent_error(
        &self,
        agent_id: AgentId,
        error: &str,
        context: Option<Value>,
    ) -> FleetResult<()> {
        log::warn!(
            "Agent {} reported error: {} (context: {})",
            agent_id,
            error,
            context.unwrap_or(Value::Null)
        );
        if self.agent(&agent_id).is_none() {
            log::debug!("Error event for unknown agent {}", agent_id);
            return Ok(());
        }
        self.recover_agent(agent_id).await.map(|_| ())
    }

    pub fn submit_task(&self, task_id: String, agent_type: Option<String>) -> FleetResult<TaskPlacement> {
        let placement = self.pools.lock().submit_task(task_id.clone(), agent_type)?;
        match &placement {
            TaskPlacement::Assigned(agent_id) => {
                log::info!("Assigned task {} to agent {}", task_id, agent_id);
                self.refresh_topology();
                self.pool_signal.notify_one();
            }
            TaskPlacement::Queued { position } => {
                log::info!("Queued task {} at position {}", task_id, position);
            }
        }
        Ok(placement)
    }

    /// Frees the agent and hands it the next queued task, returning that
    /// task's id.
    pub fn complete_task(&self, task_id: &str, agent_id: AgentId, success: bool) -> FleetResult<Option<String>> {
        let next = self.pools.lock().complete_task(&agent_id, success)?;
        log::info!(
            "Task {} on agent {} finished ({})",
            task_id,
            agent_id,
            if success { "success" } else { "failure" }
        );
        if let Some(next) = &next {
            log::info!("Assigned queued task {} to agent {}", next, agent_id);
        }
        self.refresh_topology();
        self.pool_signal.notify_one();
        Ok(next)
    }

    pub async fn rebalance_load(&self) -> FleetResult<RebalanceResult> {
        let reconciliation = self.reconcile(true);
        let assigned = self.pools.lock().rebalance()?;
        let queued = self.pools.lock().queue_len();

        self.refresh_topology();
        self.persist_pools().await;
        log::info!(
            "Rebalanced load: {} tasks assigned, {} still queued",
            assigned.len(),
            queued
        );

        Ok(RebalanceResult {
            assigned: assigned
                .into_iter()
                .map(|(task_id, agent_id)| TaskAssignment { task_id, agent_id })
                .collect(),
            queued,
            reconciliation,
        })
    }

    pub async fn resolve_conflict(&self, request: ConflictRequest) -> FleetResult<ConflictRecord> {
        let applied = {
            let pools = self.pools.lock();
            let mut ledger = self.ledger.lock();
            self.resolve_locked(&pools, &mut ledger, &request)
        };
        match applied {
            Ok(applied) => self.finish_resolution(applied).await,
            Err(e) => {
                log::warn!("Conflict rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Resolves `request` and applies its ledger effects while the caller
    /// holds the pools and ledger locks. Deferred agents lose their
    /// allocation here; the candidate is committed only if it still fits
    /// once they are gone.
    fn resolve_locked(
        &self,
        pools: &PoolRegistry,
        ledger: &mut ResourceLedger,
        request: &ConflictRequest,
    ) -> FleetResult<AppliedResolution> {
        let candidate = request.allocation.as_ref();
        if let Some(unknown) = request
            .agents
            .iter()
            .chain(candidate.map(|a| &a.agent_id))
            .find(|id| pools.agent(id).is_none())
        {
            return Err(FleetError::UnknownAgent(*unknown));
        }

        let context = contention_context(pools, ledger, request);
        let record = self.conflicts.lock().resolve(request, &context)?;

        let mut victims = Vec::new();
        match &record.resolution {
            Some(ConflictResolution::Allocation { granted, deferred }) => {
                for agent_id in deferred {
                    ledger.release(agent_id);
                    victims.push(*agent_id);
                }
                if let Some(allocation) = candidate.filter(|a| granted.contains(&a.agent_id)) {
                    if ledger.detect_conflict(allocation) {
                        log::warn!(
                            "Granted agent {} still exceeds the fleet limits; deferring it",
                            allocation.agent_id
                        );
                        ledger.release(&allocation.agent_id);
                        victims.push(allocation.agent_id);
                    } else {
                        ledger.commit(allocation.clone());
                    }
                }
            }
            Some(ConflictResolution::AbortAndRetry { victim, .. }) => victims.push(*victim),
            Some(ConflictResolution::ExecutionOrder { .. }) | None => {}
        }

        let reason = match &record.resolution {
            Some(ConflictResolution::AbortAndRetry { action, .. }) => action.clone(),
            _ => CONTENTION_REASON.to_string(),
        };
        Ok(AppliedResolution {
            record,
            victims,
            reason,
        })
    }

    async fn finish_resolution(&self, applied: AppliedResolution) -> FleetResult<ConflictRecord> {
        for agent_id in &applied.victims {
            if let Err(e) = self.terminate(*agent_id, &applied.reason).await {
                log::warn!("Failed to terminate agent {}: {}", agent_id, e);
            }
        }

        self.refresh_topology();
        self.persist_json(&keys::conflict(&applied.record.id), &applied.record)
            .await;
        self.persist_allocations().await;
        Ok(applied.record)
    }

    /// Pushes the current node count and utilization into the topology.
    fn refresh_topology(&self) -> bool {
        let utilization = self.pools.lock().fleet_utilization();
        let nodes = self.ledger.lock().len();
        self.topology.lock().update(nodes, utilization)
    }

    pub async fn change_topology(&self, mode: TopologyMode, reason: &str) -> FleetResult<TopologyChangeResult> {
        self.refresh_topology();
        let (old_mode, state, effective_mode) = {
            let mut topology = self.topology.lock();
            let old = topology.change(mode);
            (old, topology.state().clone(), topology.effective_mode())
        };

        log::info!("Topology changed {} -> {} ({})", old_mode, mode, reason);
        self.persist_json(keys::TOPOLOGY, &state).await;
        self.bus.publish(FleetEvent::TopologyChanged {
            old_mode,
            new_mode: mode,
            reason: reason.to_string(),
            timestamp: state.last_changed,
        });

        Ok(TopologyChangeResult {
            old_mode,
            new_mode: mode,
            effective_mode,
            connection_count: state.connection_count,
            efficiency: state.efficiency,
        })
    }

    pub fn build_graph(&self) -> FleetGraph {
        let agents: Vec<GraphNode> = {
            let pools = self.pools.lock();
            let ledger = self.ledger.lock();
            ledger
                .snapshot()
                .iter()
                .map(|a| {
                    let role = pools
                        .agent(&a.agent_id)
                        .map(|r| r.agent_type.clone())
                        .unwrap_or_else(|| "unknown".to_string());
                    GraphNode::new(a.agent_id.to_string(), role)
                })
                .collect()
        };
        self.refresh_topology();
        self.topology.lock().build_graph(agents)
    }

    pub async fn analyze_topology(&self) -> FleetResult<ResilienceReport> {
        let graph = self.build_graph();
        let report = self
            .analyzer
            .analyze_resilience(&graph)
            .await
            .map_err(FleetError::Analyzer)?;

        self.topology.lock().cache_analysis(report.clone());
        log::info!(
            "Topology resilience {:.2} (grade {}) over {} nodes",
            report.score,
            report.grade,
            graph.nodes.len()
        );

        if !report.critical_spofs.is_empty() {
            log::warn!(
                "Critical single points of failure: {}",
                report.critical_spofs.join(", ")
            );
            self.bus.publish(FleetEvent::SpofWarning {
                critical_spofs: report.critical_spofs.clone(),
                resilience_score: report.score,
                grade: report.grade.clone(),
                recommendations: report.recommendations.clone(),
            });
        }
        Ok(report)
    }

    pub async fn detect_spofs(&self) -> FleetResult<Vec<SpofResult>> {
        let graph = self.build_graph();
        self.analyzer
            .detect_spofs(&graph)
            .await
            .map_err(FleetError::Analyzer)
    }

    pub async fn optimize_topology(&self) -> FleetResult<Vec<Optimization>> {
        let graph = self.build_graph();
        let last = self.last_analysis();
        self.analyzer
            .suggest_optimizations(&graph, last.as_ref())
            .await
            .map_err(FleetError::Analyzer)
    }

    pub async fn scale_pool(&self, agent_type: &str, target: usize) -> FleetResult<ScaleResult> {
        let (current, min, max) = self
            .pool(agent_type)
            .map(|p| (p.live_count(), p.min_size, p.max_size))
            .ok_or_else(|| FleetError::UnknownAgentType(agent_type.to_string()))?;

        if target < min || target > max {
            let err = FleetError::InvalidScaleTarget {
                agent_type: agent_type.to_string(),
                target,
                min,
                max,
            };
            log::warn!("{}", err);
            return Err(err);
        }

        Ok(self.apply_scale(agent_type, current, target, "manual").await)
    }

    async fn apply_scale(&self, agent_type: &str, current: usize, target: usize, reason: &str) -> ScaleResult {
        let mut result = ScaleResult {
            agent_type: agent_type.to_string(),
            previous_count: current,
            target_count: target,
            spawned: Vec::new(),
            terminated: Vec::new(),
            complete: true,
            reason: None,
        };

        if target > current {
            match self.spawn(agent_type, target - current, None).await {
                Ok(spawned) => result.spawned = spawned.agent_ids,
                Err(e) => {
                    result.complete = false;
                    result.reason = Some(e.to_string());
                }
            }
        } else if target < current {
            let needed = current - target;
            let candidates = self.pools.lock().scale_down_candidates(agent_type, needed);
            for agent_id in candidates {
                match self.terminate(agent_id, reason).await {
                    Ok(_) => result.terminated.push(agent_id),
                    Err(e) => log::warn!("Scale-down could not terminate {}: {}", agent_id, e),
                }
            }
            if result.terminated.len() < needed {
                result.complete = false;
                result.reason = Some(format!(
                    "insufficient idle agents: terminated {} of {}",
                    result.terminated.len(),
                    needed
                ));
            }
        }

        if !result.complete {
            log::warn!(
                "Partial scaling of {} to {}: {}",
                agent_type,
                target,
                result.reason.as_deref().unwrap_or_default()
            );
        }
        result
    }

    /// One autoscaler iteration: evaluate, record, act, persist metrics.
    pub async fn autoscale_tick(&self) -> FleetResult<AutoscaleOutcome> {
        let (pools, utilization) = {
            let pools = self.pools.lock();
            (pools.pool_snapshot(), pools.fleet_utilization())
        };
        let decision = {
            let mut history = self.history.lock();
            let decision = self
                .autoscaler
                .evaluate(&pools, utilization, &history, Utc::now());
            history.record(decision.clone());
            decision
        };

        let result = match (&decision.action, &decision.agent_type) {
            (ScalingAction::NoAction, _) | (_, None) => None,
            (action, Some(agent_type)) => {
                log::info!(
                    "Autoscaler {:?} {} from {} to {}: {}",
                    action,
                    agent_type,
                    decision.current_count,
                    decision.target_count,
                    decision.reason
                );
                Some(
                    self.apply_scale(
                        agent_type,
                        decision.current_count,
                        decision.target_count,
                        &decision.reason,
                    )
                    .await,
                )
            }
        };

        self.persist_metrics().await;
        Ok(AutoscaleOutcome { decision, result })
    }

    pub fn record_heartbeat(&self, agent_id: AgentId) -> bool {
        self.record_heartbeat_at(agent_id, Utc::now())
    }

    pub fn record_heartbeat_at(&self, agent_id: AgentId, at: DateTime<Utc>) -> bool {
        self.heartbeats.lock().beat(&agent_id, at)
    }

    pub async fn heartbeat_tick(&self) -> Vec<RecoveryResult> {
        self.heartbeat_tick_at(Utc::now()).await
    }

    /// Fails and recovers every agent whose heartbeat is older than the
    /// configured timeout at `now`.
    pub async fn heartbeat_tick_at(&self, now: DateTime<Utc>) -> Vec<RecoveryResult> {
        let stale = self
            .heartbeats
            .lock()
            .stale(now, self.config.heartbeat.timeout());

        let mut results = Vec::with_capacity(stale.len());
        for agent_id in stale {
            log::warn!("Agent {} missed its heartbeat deadline", agent_id);
            match self.recover_agent(agent_id).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    log::warn!("Recovery of agent {} failed: {}", agent_id, e);
                    self.heartbeats.lock().untrack(&agent_id);
                }
            }
        }
        results
    }

    /// Marks an agent failed and releases everything it held.
    async fn fail_agent(&self, agent_id: AgentId, cause: &str) -> FleetResult<AgentRecord> {
        let (record, was_live) = {
            let mut pools = self.pools.lock();
            let was_live = pools
                .agent(&agent_id)
                .map(AgentRecord::is_live)
                .ok_or(FleetError::UnknownAgent(agent_id))?;
            (pools.mark_failed(&agent_id)?, was_live)
        };
        self.ledger.lock().release(&agent_id);
        self.heartbeats.lock().untrack(&agent_id);

        if was_live {
            log::warn!("Agent {} ({}) marked failed: {}", agent_id, record.agent_type, cause);
            self.bus.publish(FleetEvent::TerminateRequested {
                agent_id,
                reason: cause.to_string(),
            });
            self.refresh_topology();
            self.signal_pool_change(&record.agent_type);
            self.persist_pools().await;
            self.persist_allocations().await;
        }
        Ok(record)
    }

    /// Replaces a failed agent with a new one of the same type and config,
    /// retrying up to the configured limit.
    pub async fn recover_agent(&self, agent_id: AgentId) -> FleetResult<RecoveryResult> {
        let record = self.agent(&agent_id).ok_or(FleetError::UnknownAgent(agent_id))?;
        if record.is_live() {
            self.fail_agent(agent_id, "recovery").await?;
        }

        let max_retries = self.config.heartbeat.max_retries;
        let backoff = self.config.heartbeat.retry_backoff_ms;
        let mut attempts = 0;

        while attempts < max_retries {
            attempts += 1;
            match self
                .spawn(&record.agent_type, 1, Some(record.config.clone()))
                .await
            {
                Ok(spawned) => {
                    if let Some(new_agent_id) = spawned.agent_ids.first().copied() {
                        self.pools.lock().forget_failed(&agent_id);
                        if let Err(e) = self.store.delete(&keys::agent(&agent_id)).await {
                            log::warn!("Failed to delete {}: {}", keys::agent(&agent_id), e);
                        }
                        log::info!(
                            "Recovered agent {} as {} after {} attempt(s)",
                            agent_id,
                            new_agent_id,
                            attempts
                        );
                        return Ok(RecoveryResult::recovered(agent_id, new_agent_id, attempts));
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Recovery attempt {}/{} for agent {} failed: {}",
                        attempts,
                        max_retries,
                        agent_id,
                        e
                    );
                }
            }
            if backoff > 0 && attempts < max_retries {
                tokio::time::sleep(std::time::Duration::from_millis(backoff * attempts as u64)).await;
            }
        }

        log::error!(
            "Giving up on agent {} after {} recovery attempts",
            agent_id,
            attempts
        );
        Ok(RecoveryResult::exhausted(agent_id, attempts))
    }

    async fn persist_json<T: Serialize + Sync + ?Sized>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to serialize {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.store(key, value, None).await {
            log::warn!("Failed to persist {}: {}", key, e);
        }
    }

    async fn persist_pools(&self) {
        let pools = self.pools();
        self.persist_json(keys::POOLS, &pools).await;
    }

    async fn persist_allocations(&self) {
        let allocations = self.allocations();
        self.persist_json(keys::ALLOCATIONS, &allocations).await;
    }

    async fn persist_metrics(&self) {
        let metrics = self.metrics();
        self.persist_json(keys::METRICS, &metrics).await;
    }

    pub async fn persist_state(&self) {
        let topology = self.topology_state();
        self.persist_json(keys::TOPOLOGY, &topology).await;
        self.persist_pools().await;
        self.persist_allocations().await;
        self.persist_metrics().await;
    }

    /// Loads whatever persisted state is available. Missing or unreadable
    /// keys leave the defaults in place.
    pub async fn restore_state(&self) -> RestoreReport {
        let mut report = RestoreReport::default();

        if let Some(pools) = self.load::<Vec<AgentPool>>(keys::POOLS).await {
            report.pools = self.pools.lock().restore_pools(pools);
        }
        if let Some(allocations) = self.load::<Vec<ResourceAllocation>>(keys::ALLOCATIONS).await {
            let mut records = Vec::with_capacity(allocations.len());
            for allocation in &allocations {
                match self.load::<AgentRecord>(&keys::agent(&allocation.agent_id)).await {
                    Some(record) => records.push(record),
                    None => log::warn!(
                        "Dropping persisted allocation of agent {} which has no record",
                        allocation.agent_id
                    ),
                }
            }

            let now = Utc::now();
            let restored = {
                let mut pools = self.pools.lock();
                let restored = pools.restore_agents(records, now);
                let persisted = allocations.len();
                let kept: Vec<ResourceAllocation> = allocations
                    .into_iter()
                    .filter(|a| restored.contains(&a.agent_id))
                    .collect();
                report.orphaned_allocations = persisted - kept.len();
                report.allocations = kept.len();
                self.ledger.lock().restore(kept);
                restored
            };
            report.agents = restored.len();

            let mut heartbeats = self.heartbeats.lock();
            for agent_id in &restored {
                heartbeats.track(*agent_id, now);
            }
        }
        if let Some(metrics) = self.load::<FleetMetrics>(keys::METRICS).await {
            self.pools
                .lock()
                .set_task_counters(metrics.tasks_completed, metrics.tasks_failed);
            report.metrics = true;
        }
        if let Some(state) = self.load::<TopologyState>(keys::TOPOLOGY).await {
            self.topology.lock().restore(state);
            report.topology = true;
        }
        self.refresh_topology();

        log::info!(
            "Restored state: topology={}, pools={}, agents={}, allocations={} ({} orphaned), metrics={}",
            report.topology,
            report.pools,
            report.agents,
            report.allocations,
            report.orphaned_allocations,
            report.metrics
        );
        report
    }

    async fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.retrieve(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    log::warn!("Ignoring unreadable {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Failed to load {}: {}", key, e);
                None
            }
        }
    }

    /// Compact view of fleet state attached to task failure records.
    pub(crate) fn snapshot_value(&self) -> Value {
        let metrics = self.metrics();
        json!({
            "status": self.fleet_status(),
            "pools": self.pools(),
            "topology": self.topology_state(),
            "metrics": metrics,
        })
    }
}

/// Priorities come from the agent records. Capacity context is only built
/// when the request carries a candidate allocation: listed agents contribute
/// their committed demand and everyone else counts as reserved.
fn contention_context(
    pools: &PoolRegistry,
    ledger: &ResourceLedger,
    request: &ConflictRequest,
) -> ConflictContext {
    let mut priorities: HashMap<AgentId, _> = request
        .agents
        .iter()
        .filter_map(|id| pools.agent(id).map(|r| (*id, r.priority)))
        .collect();

    let capacity = request.allocation.as_ref().map(|candidate| {
        priorities.insert(candidate.agent_id, candidate.priority);

        let mut demands: HashMap<AgentId, (f64, u64)> = request
            .agents
            .iter()
            .filter_map(|id| ledger.allocation(id).map(|a| (*id, (a.cpu, a.memory))))
            .collect();
        demands.insert(candidate.agent_id, (candidate.cpu, candidate.memory));

        let (reserved_cpu, reserved_memory) = ledger
            .snapshot()
            .iter()
            .filter(|a| !demands.contains_key(&a.agent_id))
            .fold((0.0, 0), |(cpu, mem), a| (cpu + a.cpu, mem + a.memory));

        CapacityContext {
            demands,
            reserved_cpu,
            reserved_memory,
            limit: Some(ledger.capacity()),
        }
    });

    ConflictContext {
        priorities,
        capacity,
    }
}

/// Feeds inbound events published on the in-process bus into the coordinator.
async fn run_event_pump(coordinator: FleetCoordinator) {
    let mut receiver = coordinator.bus().subscribe();
    let mut status = coordinator.subscribe_status();
    log::info!("Event pump started");

    loop {
        if *status.borrow() != FleetStatus::Active {
            break;
        }
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(event) if event.is_inbound() => {
                    let name = event.name();
                    if let Err(e) = coordinator.handle_event(event).await {
                        log::warn!("Failed to handle {}: {}", name, e);
                    }
                }
                Ok(_) | Err(EventBusError::Lagged(_)) => {}
                Err(_) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("Event pump stopped");
}
