use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use super::coordinator::FleetCoordinator;
use crate::error::{FleetError, FleetResult};
use crate::storage::keys;
use crate::types::{ConflictRequest, ConflictType, FleetTask, TaskResult};

impl FleetCoordinator {
    /// Parses and runs a raw task payload. Parse failures go through the same
    /// failure recording as execution errors.
    pub async fn execute_payload(&self, task_id: &str, payload: Value) -> FleetResult<TaskResult> {
        let task_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        match FleetTask::parse(payload) {
            Ok(task) => self.execute_task(task_id, task).await,
            Err(e) => {
                self.record_failure(task_id, &task_type, &e).await;
                Err(e)
            }
        }
    }

    /// Single entry point for task execution. Every error is logged and
    /// persisted under `fleet/errors/{taskId}` before being returned.
    pub async fn execute_task(&self, task_id: &str, task: FleetTask) -> FleetResult<TaskResult> {
        let task_type = task.task_type();
        log::debug!("Executing {} task {}", task_type, task_id);

        match self.dispatch(task).await {
            Ok((success, output)) => Ok(TaskResult {
                task_id: task_id.to_string(),
                task_type: task_type.to_string(),
                success,
                output,
                completed_at: Utc::now(),
            }),
            Err(e) => {
                self.record_failure(task_id, task_type, &e).await;
                Err(e)
            }
        }
    }

    async fn dispatch(&self, task: FleetTask) -> FleetResult<(bool, Value)> {
        match task {
            FleetTask::FleetInitialize => ok(&self.initialize().await?),
            FleetTask::AgentSpawn {
                agent_type,
                count,
                config,
            } => ok(&self.spawn(&agent_type, count, config).await?),
            FleetTask::AgentTerminate { agent_id, reason } => ok(&self
                .terminate(agent_id, reason.as_deref().unwrap_or("requested"))
                .await?),
            FleetTask::TopologyChange { mode, reason } => ok(&self
                .change_topology(mode, reason.as_deref().unwrap_or("requested"))
                .await?),
            FleetTask::RebalanceLoad => ok(&self.rebalance_load().await?),
            FleetTask::ResolveConflict {
                conflict_type,
                agents,
                severity,
                allocation,
            } => {
                let conflict_type: ConflictType = conflict_type.parse()?;
                let record = self
                    .resolve_conflict(ConflictRequest {
                        conflict_type,
                        agents,
                        severity,
                        allocation,
                    })
                    .await?;
                ok(&record)
            }
            FleetTask::FleetStatus => ok(&self.status()),
            FleetTask::FleetMetrics => ok(&self.metrics()),
            FleetTask::ScalePool {
                agent_type,
                target_count,
            } => {
                let result = self.scale_pool(&agent_type, target_count).await?;
                Ok((result.complete, serde_json::to_value(&result)?))
            }
            FleetTask::RecoverAgent { agent_id } => {
                let result = self.recover_agent(agent_id).await?;
                Ok((result.recovered, serde_json::to_value(&result)?))
            }
            FleetTask::TopologyAnalyze => ok(&self.analyze_topology().await?),
            FleetTask::TopologySpofCheck => {
                let spofs = self.detect_spofs().await?;
                let critical = spofs.iter().filter(|s| s.critical).count();
                Ok((
                    true,
                    json!({ "spofs": spofs, "criticalCount": critical }),
                ))
            }
            FleetTask::TopologyOptimize => {
                let optimizations = self.optimize_topology().await?;
                Ok((true, json!({ "optimizations": optimizations })))
            }
        }
    }

    async fn record_failure(&self, task_id: &str, task_type: &str, error: &FleetError) {
        let chain = error_chain(error);
        if error.is_validation() {
            log::warn!("Task {} ({}) rejected: {}", task_id, task_type, error);
        } else {
            log::error!("Task {} ({}) failed: {}", task_id, task_type, chain.join(": "));
        }

        let record = json!({
            "taskId": task_id,
            "taskType": task_type,
            "error": error.to_string(),
            "chain": chain,
            "validation": error.is_validation(),
            "snapshot": self.snapshot_value(),
            "timestamp": Utc::now(),
        });
        let key = keys::task_error(task_id);
        if let Err(e) = self
            .store()
            .store(&key, record, Some(keys::ERROR_TTL_SECONDS))
            .await
        {
            log::warn!("Failed to persist {}: {}", key, e);
        }
    }
}

fn ok<T: Serialize>(output: &T) -> FleetResult<(bool, Value)> {
    Ok((true, serde_json::to_value(output)?))
}

fn error_chain(error: &FleetError) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = std::error::Error::source(cause);
    }
    chain
}
