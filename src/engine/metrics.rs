use chrono::{DateTime, Utc};

use super::pool_registry::PoolRegistry;
use crate::types::FleetMetrics;

/// Rolls pool counters and task counters up into fleet metrics.
pub fn aggregate(registry: &PoolRegistry, started_at: DateTime<Utc>, now: DateTime<Utc>) -> FleetMetrics {
    let (active, idle, busy, failed) = registry.pools().fold((0, 0, 0, 0), |acc, p| {
        (acc.0 + p.active, acc.1 + p.idle, acc.2 + p.busy, acc.3 + p.failed)
    });
    let total = active + busy;
    let completed = registry.tasks_completed();
    let task_failures = registry.tasks_failed();

    let utilization = if total == 0 {
        0.0
    } else {
        busy as f64 / total as f64
    };
    let finished = completed + task_failures;
    let failure_rate = if finished == 0 {
        0.0
    } else {
        task_failures as f64 / finished as f64
    };
    let minutes = now.signed_duration_since(started_at).num_milliseconds() as f64 / 60_000.0;
    let throughput = if minutes > 0.0 {
        completed as f64 / minutes
    } else {
        0.0
    };

    FleetMetrics {
        total_agents: total,
        active_agents: active,
        idle_agents: idle,
        busy_agents: busy,
        failed_agents: failed,
        tasks_completed: completed,
        tasks_failed: task_failures,
        queued_tasks: registry.queue_len(),
        utilization,
        failure_rate,
        throughput,
        collected_at: now,
    }
}
