//! Task boundary tests: every task type dispatched from a raw JSON payload,
//! failure recording under `fleet/errors/`, and behaviour with a failing
//! store or resilience analyzer.

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;

use fleet_coordinator::config::{FleetConfig, PoolConfig};
use fleet_coordinator::events::FleetEvent;
use fleet_coordinator::resilience::{
    ArticulationPointAnalyzer, Optimization, ResilienceAnalyzer, ResilienceReport, SpofResult,
};
use fleet_coordinator::storage::{InMemoryStore, KeyValueStore};
use fleet_coordinator::types::{AgentId, FleetGraph, Priority, ResourceAllocation};
use fleet_coordinator::{FleetCoordinator, FleetError};

struct FailingAnalyzer;

#[async_trait::async_trait]
impl ResilienceAnalyzer for FailingAnalyzer {
    async fn analyze_resilience(&self, _graph: &FleetGraph) -> Result<ResilienceReport> {
        Err(anyhow::anyhow!("graph service unavailable"))
    }

    async fn detect_spofs(&self, _graph: &FleetGraph) -> Result<Vec<SpofResult>> {
        Err(anyhow::anyhow!("graph service unavailable"))
    }

    async fn suggest_optimizations(
        &self,
        _graph: &FleetGraph,
        _last: Option<&ResilienceReport>,
    ) -> Result<Vec<Optimization>> {
        Err(anyhow::anyhow!("graph service unavailable"))
    }
}

struct ReadOnlyStore;

#[async_trait::async_trait]
impl KeyValueStore for ReadOnlyStore {
    async fn store(&self, key: &str, _value: Value, _ttl_seconds: Option<u64>) -> Result<()> {
        Err(anyhow::anyhow!("store is read-only: {}", key))
    }

    async fn retrieve(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(anyhow::anyhow!("store is read-only"))
    }
}

fn create_test_config() -> FleetConfig {
    FleetConfig {
        pools: vec![
            PoolConfig {
                agent_type: "executor".to_string(),
                min_size: 2,
                max_size: 6,
                priority: Priority::High,
            },
            PoolConfig {
                agent_type: "analyzer".to_string(),
                min_size: 0,
                max_size: 3,
                priority: Priority::Low,
            },
        ],
        ..FleetConfig::default()
    }
}

fn create_coordinator() -> (FleetCoordinator, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let coordinator = FleetCoordinator::new(
        create_test_config(),
        store.clone(),
        Arc::new(ArticulationPointAnalyzer::new()),
    )
    .unwrap();
    (coordinator, store)
}

async fn spawn_confirmed(coordinator: &FleetCoordinator, agent_type: &str, count: usize) -> Vec<AgentId> {
    let output = coordinator
        .execute_payload(
            "spawn",
            json!({ "type": "agent-spawn", "agentType": agent_type, "count": count }),
        )
        .await
        .unwrap()
        .output;
    let ids: Vec<AgentId> = serde_json::from_value(output["agentIds"].clone()).unwrap();
    for agent_id in &ids {
        coordinator
            .handle_event(FleetEvent::AgentSpawned {
                agent_id: *agent_id,
                agent_type: agent_type.to_string(),
                capabilities: vec!["code".to_string()],
            })
            .await
            .unwrap();
    }
    ids
}

#[tokio::test]
async fn test_unknown_task_type_is_recorded() {
    let (coordinator, store) = create_coordinator();

    let err = coordinator
        .execute_payload("t-404", json!({ "type": "fleet-teleport" }))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::UnknownTaskType(ref t) if t == "fleet-teleport"));
    let stored = store.retrieve("fleet/errors/t-404").await.unwrap().unwrap();
    assert_eq!(stored["taskType"], "fleet-teleport");
    assert_eq!(stored["validation"], true);
    assert!(stored["snapshot"].is_object());
    assert!(store.expires_at("fleet/errors/t-404").is_some());
}

#[tokio::test]
async fn test_malformed_payload_is_invalid_task() {
    let (coordinator, store) = create_coordinator();

    let err = coordinator
        .execute_payload("t-1", json!({ "type": "scale-pool", "agentType": "executor" }))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::InvalidTask { .. }));
    assert!(store.retrieve("fleet/errors/t-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_initialize_and_status_tasks() {
    let (coordinator, _) = create_coordinator();

    let init = coordinator
        .execute_payload("t-init", json!({ "type": "fleet-initialize" }))
        .await
        .unwrap();
    assert!(init.success);
    assert_eq!(init.task_type, "fleet-initialize");

    let status = coordinator
        .execute_payload("t-status", json!({ "type": "fleet-status" }))
        .await
        .unwrap();
    assert_eq!(status.output["status"], "active");
    assert_eq!(status.output["metrics"]["totalAgents"], 2);

    let metrics = coordinator
        .execute_payload("t-metrics", json!({ "type": "fleet-metrics" }))
        .await
        .unwrap();
    assert_eq!(metrics.output["activeAgents"], 2);
}

#[tokio::test]
async fn test_spawn_task_capacity_error() {
    let (coordinator, store) = create_coordinator();

    let err = coordinator
        .execute_payload(
            "t-big",
            json!({ "type": "agent-spawn", "agentType": "analyzer", "count": 4 }),
        )
        .await
        .unwrap_err();

    assert!(err.is_capacity());
    let stored = store.retrieve("fleet/errors/t-big").await.unwrap().unwrap();
    assert!(stored["error"].as_str().unwrap().contains("maxSize 3"));
}

#[tokio::test]
async fn test_scale_pool_task() {
    let (coordinator, _) = create_coordinator();

    let result = coordinator
        .execute_payload(
            "t-scale",
            json!({ "type": "scale-pool", "agentType": "executor", "targetCount": 4 }),
        )
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.output["spawned"].as_array().unwrap().len(), 4);
    assert_eq!(coordinator.pool("executor").unwrap().live_count(), 4);

    let err = coordinator
        .execute_payload(
            "t-scale-2",
            json!({ "type": "scale-pool", "agentType": "executor", "targetCount": 9 }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::InvalidScaleTarget { max: 6, .. }));
}

#[tokio::test]
async fn test_scale_down_without_idle_agents_is_incomplete() {
    let (coordinator, _) = create_coordinator();
    spawn_confirmed(&coordinator, "executor", 4).await;
    for i in 0..4 {
        coordinator.submit_task(format!("job-{}", i), None).unwrap();
    }

    let result = coordinator
        .execute_payload(
            "t-down",
            json!({ "type": "scale-pool", "agentType": "executor", "targetCount": 2 }),
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.output["reason"]
        .as_str()
        .unwrap()
        .starts_with("insufficient idle agents"));
}

#[tokio::test]
async fn test_deadlock_terminates_first_agent() {
    let (coordinator, _) = create_coordinator();
    let ids = spawn_confirmed(&coordinator, "executor", 2).await;
    let mut events = coordinator.bus().subscribe();

    let result = coordinator
        .execute_payload(
            "t-deadlock",
            json!({ "type": "resolve-conflict", "conflictType": "deadlock", "agents": ids }),
        )
        .await
        .unwrap();

    assert_eq!(result.output["resolved"], true);
    assert_eq!(result.output["strategy"], "victim-selection");
    assert_eq!(result.output["resolution"]["victim"], ids[0].to_string());
    assert_eq!(result.output["resolution"]["action"], "abort-and-retry");
    assert!(events.drain().iter().any(|e| matches!(
        e,
        FleetEvent::TerminateRequested { agent_id, .. } if *agent_id == ids[0]
    )));
}

#[tokio::test]
async fn test_priority_conflict_keeps_submitted_order() {
    let (coordinator, _) = create_coordinator();
    let analyzers = spawn_confirmed(&coordinator, "analyzer", 1).await;
    let executors = spawn_confirmed(&coordinator, "executor", 1).await;

    let record = coordinator
        .execute_payload(
            "t-order",
            json!({
                "type": "resolve-conflict",
                "conflictType": "priority-conflict",
                "agents": [analyzers[0], executors[0]],
            }),
        )
        .await
        .unwrap()
        .output;

    assert_eq!(record["strategy"], "priority-queue");
    assert_eq!(record["resolution"]["order"][0], analyzers[0].to_string());
    assert_eq!(record["resolution"]["order"][1], executors[0].to_string());
}

#[tokio::test]
async fn test_unsupported_conflict_type_and_empty_conflict() {
    let (coordinator, _) = create_coordinator();

    let err = coordinator
        .execute_payload(
            "t-c1",
            json!({ "type": "resolve-conflict", "conflictType": "livelock", "agents": [] }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::UnknownConflictType(_)));

    let err = coordinator
        .execute_payload(
            "t-c2",
            json!({ "type": "resolve-conflict", "conflictType": "deadlock", "agents": [] }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::EmptyConflict));
    assert!(coordinator.conflicts().is_empty());
}

#[tokio::test]
async fn test_conflict_with_unknown_agent_is_rejected() {
    let (coordinator, _) = create_coordinator();
    let ids = spawn_confirmed(&coordinator, "executor", 2).await;
    let stranger = AgentId::new_v4();
    let allocations = coordinator.allocations();

    let err = coordinator
        .execute_payload(
            "t-c3",
            json!({ "type": "resolve-conflict", "conflictType": "deadlock", "agents": [stranger, ids[0]] }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::UnknownAgent(id) if id == stranger));

    let candidate = ResourceAllocation::new(stranger, 0.5, 512, Priority::Critical);
    let err = coordinator
        .execute_payload(
            "t-c4",
            json!({
                "type": "resolve-conflict",
                "conflictType": "resource-contention",
                "agents": ids,
                "allocation": candidate,
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::UnknownAgent(id) if id == stranger));

    assert!(coordinator.conflicts().is_empty());
    assert_eq!(coordinator.allocations(), allocations);
    assert!(ids.iter().all(|id| !coordinator.agent(id).unwrap().terminating));
}

#[tokio::test]
async fn test_topology_analysis_flags_hub() {
    let (coordinator, _) = create_coordinator();
    spawn_confirmed(&coordinator, "executor", 3).await;
    let mut events = coordinator.bus().subscribe();

    let analysis = coordinator
        .execute_payload("t-analyze", json!({ "type": "topology-analyze" }))
        .await
        .unwrap()
        .output;

    assert_eq!(analysis["criticalSpofs"][0], "coordinator");
    assert_eq!(analysis["grade"], "F");
    assert!(events
        .drain()
        .iter()
        .any(|e| matches!(e, FleetEvent::SpofWarning { .. })));

    let spofs = coordinator
        .execute_payload("t-spof", json!({ "type": "topology-spof-check" }))
        .await
        .unwrap()
        .output;
    assert_eq!(spofs["criticalCount"], 1);

    let optimizations = coordinator
        .execute_payload("t-opt", json!({ "type": "topology-optimize" }))
        .await
        .unwrap()
        .output;
    let first = &optimizations["optimizations"][0];
    assert_eq!(first["suggestedMode"], "mesh");
    assert!(first["expectedScoreGain"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_topology_change_task() {
    let (coordinator, _) = create_coordinator();
    spawn_confirmed(&coordinator, "executor", 4).await;

    let result = coordinator
        .execute_payload(
            "t-topo",
            json!({ "type": "topology-change", "mode": "hybrid", "reason": "scale out" }),
        )
        .await
        .unwrap()
        .output;

    assert_eq!(result["oldMode"], "hierarchical");
    assert_eq!(result["newMode"], "hybrid");
    assert_eq!(result["connectionCount"], 5);
}

#[tokio::test]
async fn test_recover_and_rebalance_tasks() {
    let (coordinator, _) = create_coordinator();
    let ids = spawn_confirmed(&coordinator, "executor", 1).await;

    let recovery = coordinator
        .execute_payload(
            "t-recover",
            json!({ "type": "recover-agent", "agentId": ids[0] }),
        )
        .await
        .unwrap();
    assert!(recovery.success);
    assert_eq!(recovery.output["recovered"], true);
    assert_eq!(coordinator.pool("executor").unwrap().failed, 1);

    coordinator.submit_task("queued-1".to_string(), None).unwrap();
    let rebalance = coordinator
        .execute_payload("t-rebalance", json!({ "type": "rebalance-load" }))
        .await
        .unwrap()
        .output;
    assert_eq!(rebalance["queued"], 1);
    assert_eq!(rebalance["reconciliation"]["applied"], true);
}

#[tokio::test]
async fn test_analyzer_failure_surfaces_as_task_error() {
    let store = Arc::new(InMemoryStore::new());
    let coordinator =
        FleetCoordinator::new(create_test_config(), store.clone(), Arc::new(FailingAnalyzer))
            .unwrap();

    let err = coordinator
        .execute_payload("t-analyze", json!({ "type": "topology-analyze" }))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::Analyzer(_)));
    assert!(!err.is_validation());
    let stored = store.retrieve("fleet/errors/t-analyze").await.unwrap().unwrap();
    assert_eq!(stored["validation"], false);
    assert!(stored["chain"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c.as_str().unwrap().contains("graph service unavailable")));
}

#[tokio::test]
async fn test_store_failures_do_not_fail_operations() {
    let coordinator = FleetCoordinator::new(
        create_test_config(),
        Arc::new(ReadOnlyStore),
        Arc::new(ArticulationPointAnalyzer::new()),
    )
    .unwrap();

    coordinator.initialize().await.unwrap();
    let ids = spawn_confirmed(&coordinator, "analyzer", 2).await;
    coordinator.terminate(ids[0], "requested").await.unwrap();
    coordinator
        .handle_event(FleetEvent::AgentTerminated {
            agent_id: ids[0],
            reason: None,
        })
        .await
        .unwrap();

    assert_eq!(coordinator.pool("analyzer").unwrap().live_count(), 1);
    assert_eq!(coordinator.pool("executor").unwrap().live_count(), 2);
    let report = coordinator.restore_state().await;
    assert_eq!(report.pools, 0);
}
