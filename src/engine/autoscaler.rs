use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::coordinator::FleetCoordinator;
use crate::config::AutoScalingConfig;
use crate::types::{AgentPool, FleetStatus, ScalingAction, ScalingDecision};

/// Bounded log of scaling decisions plus the last time each pool acted.
#[derive(Debug)]
pub struct ScalingHistory {
    decisions: VecDeque<ScalingDecision>,
    limit: usize,
    last_action: HashMap<String, DateTime<Utc>>,
}

impl ScalingHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            decisions: VecDeque::with_capacity(limit),
            limit: limit.max(1),
            last_action: HashMap::new(),
        }
    }

    pub fn record(&mut self, decision: ScalingDecision) {
        if decision.action != ScalingAction::NoAction {
            if let Some(agent_type) = &decision.agent_type {
                self.last_action.insert(agent_type.clone(), decision.timestamp);
            }
        }
        if self.decisions.len() == self.limit {
            self.decisions.pop_front();
        }
        self.decisions.push_back(decision);
    }

    pub fn last_action(&self, agent_type: &str) -> Option<DateTime<Utc>> {
        self.last_action.get(agent_type).copied()
    }

    pub fn decisions(&self) -> impl Iterator<Item = &ScalingDecision> {
        self.decisions.iter()
    }

    /// Newest first.
    pub fn recent(&self, count: usize) -> Vec<ScalingDecision> {
        self.decisions.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AutoScaler {
    config: AutoScalingConfig,
}

impl AutoScaler {
    pub fn new(config: AutoScalingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AutoScalingConfig {
        &self.config
    }

    /// Decides the next scaling step. Pure: the caller applies and records it.
    pub fn evaluate(
        &self,
        pools: &[AgentPool],
        fleet_utilization: f64,
        history: &ScalingHistory,
        now: DateTime<Utc>,
    ) -> ScalingDecision {
        if let Some(pool) = pools.iter().find(|p| p.live_count() < p.min_size) {
            return decision(
                ScalingAction::ScaleUp,
                pool,
                pool.min_size,
                format!("below-minimum: {} of {}", pool.live_count(), pool.min_size),
                now,
            );
        }

        let Some(pool) = busiest(pools) else {
            return ScalingDecision::no_action(None, 0, "no-pools");
        };
        let current = pool.live_count();

        let (action, target, reason) = if fleet_utilization > self.config.scale_up_threshold
            && current < pool.max_size
        {
            (
                ScalingAction::ScaleUp,
                (current + self.config.scale_up_step).min(pool.max_size),
                format!(
                    "utilization {:.2} above {:.2}",
                    fleet_utilization, self.config.scale_up_threshold
                ),
            )
        } else if fleet_utilization < self.config.scale_down_threshold && current > pool.min_size {
            (
                ScalingAction::ScaleDown,
                current
                    .saturating_sub(self.config.scale_down_step)
                    .max(pool.min_size),
                format!(
                    "utilization {:.2} below {:.2}",
                    fleet_utilization, self.config.scale_down_threshold
                ),
            )
        } else {
            return ScalingDecision::no_action(
                Some(pool.agent_type.clone()),
                current,
                "within-thresholds",
            );
        };

        if let Some(last) = history.last_action(&pool.agent_type) {
            let cooldown = chrono::Duration::milliseconds(self.config.cooldown_ms as i64);
            if now.signed_duration_since(last) < cooldown {
                return ScalingDecision::no_action(Some(pool.agent_type.clone()), current, "cooldown");
            }
        }

        decision(action, pool, target, reason, now)
    }
}

fn decision(
    action: ScalingAction,
    pool: &AgentPool,
    target: usize,
    reason: String,
    now: DateTime<Utc>,
) -> ScalingDecision {
    ScalingDecision {
        action,
        agent_type: Some(pool.agent_type.clone()),
        current_count: pool.live_count(),
        target_count: target,
        reason,
        timestamp: now,
    }
}

/// Highest utilization wins; ties go to the first pool.
fn busiest(pools: &[AgentPool]) -> Option<&AgentPool> {
    pools.iter().fold(None, |best: Option<&AgentPool>, pool| match best {
        Some(b) if b.utilization >= pool.utilization => Some(b),
        _ => Some(pool),
    })
}

/// Runs scaling iterations until the fleet leaves the active state.
pub(crate) async fn run(coordinator: FleetCoordinator) {
    let cooldown = coordinator.config().autoscaling.cooldown();
    let mut status = coordinator.subscribe_status();
    log::info!("Autoscaler started (cooldown {:?})", cooldown);

    loop {
        if *status.borrow() != FleetStatus::Active {
            break;
        }

        if let Err(e) = coordinator.autoscale_tick().await {
            log::warn!("Autoscaler iteration failed: {}", e);
        }

        tokio::select! {
            _ = coordinator.pool_changed() => {
                // Give spawn intents from the same burst a moment to land.
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            _ = tokio::time::sleep(cooldown) => {}
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("Autoscaler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::types::Priority;

    fn pool(agent_type: &str, min: usize, max: usize, active: usize, busy: usize) -> AgentPool {
        let mut pool = AgentPool::from_config(&PoolConfig {
            agent_type: agent_type.to_string(),
            min_size: min,
            max_size: max,
            priority: Priority::Medium,
        });
        pool.active = active;
        pool.busy = busy;
        pool.refresh_utilization();
        pool
    }

    fn scaler() -> AutoScaler {
        AutoScaler::new(AutoScalingConfig::default())
    }

    #[test]
    fn test_scale_up_on_high_utilization() {
        let pools = vec![pool("executor", 3, 15, 1, 4)];
        let decision = scaler().evaluate(&pools, 0.9, &ScalingHistory::new(100), Utc::now());

        assert_eq!(decision.action, ScalingAction::ScaleUp);
        assert_eq!(decision.current_count, 5);
        assert_eq!(decision.target_count, 7);
    }

    #[test]
    fn test_scale_up_capped_at_max() {
        let pools = vec![pool("executor", 3, 6, 0, 5)];
        let decision = scaler().evaluate(&pools, 1.0, &ScalingHistory::new(100), Utc::now());
        assert_eq!(decision.target_count, 6);
    }

    #[test]
    fn test_scale_down_on_low_utilization() {
        let pools = vec![pool("executor", 3, 15, 5, 0)];
        let decision = scaler().evaluate(&pools, 0.0, &ScalingHistory::new(100), Utc::now());

        assert_eq!(decision.action, ScalingAction::ScaleDown);
        assert_eq!(decision.target_count, 4);
    }

    #[test]
    fn test_no_scale_down_at_minimum() {
        let pools = vec![pool("executor", 3, 15, 3, 0)];
        let decision = scaler().evaluate(&pools, 0.0, &ScalingHistory::new(100), Utc::now());
        assert_eq!(decision.action, ScalingAction::NoAction);
        assert_eq!(decision.target_count, 3);
    }

    #[test]
    fn test_below_minimum_scales_to_minimum() {
        let pools = vec![pool("executor", 3, 15, 1, 0)];
        let decision = scaler().evaluate(&pools, 0.0, &ScalingHistory::new(100), Utc::now());

        assert_eq!(decision.action, ScalingAction::ScaleUp);
        assert_eq!(decision.target_count, 3);
        assert!(decision.reason.starts_with("below-minimum"));
    }

    #[test]
    fn test_no_pools() {
        let decision = scaler().evaluate(&[], 0.0, &ScalingHistory::new(100), Utc::now());
        assert_eq!(decision.action, ScalingAction::NoAction);
        assert_eq!(decision.agent_type, None);
    }

    #[test]
    fn test_busiest_pool_selected() {
        let pools = vec![pool("analyzer", 0, 5, 2, 0), pool("executor", 0, 15, 1, 4)];
        let decision = scaler().evaluate(&pools, 0.9, &ScalingHistory::new(100), Utc::now());
        assert_eq!(decision.agent_type.as_deref(), Some("executor"));
    }

    #[test]
    fn test_cooldown_suppresses_action() {
        let pools = vec![pool("executor", 3, 15, 1, 4)];
        let now = Utc::now();
        let mut history = ScalingHistory::new(100);
        let first = scaler().evaluate(&pools, 0.9, &history, now);
        history.record(first);

        let second = scaler().evaluate(&pools, 0.9, &history, now + chrono::Duration::seconds(10));
        assert_eq!(second.action, ScalingAction::NoAction);
        assert_eq!(second.reason, "cooldown");

        let later = scaler().evaluate(&pools, 0.9, &history, now + chrono::Duration::seconds(61));
        assert_eq!(later.action, ScalingAction::ScaleUp);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = ScalingHistory::new(3);
        for i in 0..5 {
            history.record(ScalingDecision::no_action(None, i, "within-thresholds"));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.recent(1)[0].current_count, 4);
        assert_eq!(history.decisions().next().unwrap().current_count, 2);
    }
}
