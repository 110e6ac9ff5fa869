use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::FleetError;
use crate::types::resource::is_valid_memory;
use crate::types::{AgentSpawnConfig, Priority, TopologyMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub fleet_id: String,
    pub max_agents: usize,
    pub topology: TopologyMode,
    pub pools: Vec<PoolConfig>,
    pub resources: ResourceLimits,
    pub default_agent: AgentSpawnConfig,
    pub autoscaling: AutoScalingConfig,
    pub heartbeat: HeartbeatConfig,
    pub history_limit: usize,
    pub event_capacity: usize,
    pub api_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub agent_type: String,
    pub min_size: usize,
    pub max_size: usize,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_concurrent: usize,
    pub cpu_per_agent: f64,
    pub memory_per_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoScalingConfig {
    pub enabled: bool,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// Delay between recovery attempts. Zero retries immediately.
    pub retry_backoff_ms: u64,
    /// How long a spawn intent may stay unconfirmed before reconciliation
    /// treats it as lost.
    pub spawn_confirm_timeout_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            fleet_id: "fleet".to_string(),
            max_agents: 50,
            topology: TopologyMode::Hierarchical,
            pools: vec![PoolConfig {
                agent_type: "worker".to_string(),
                min_size: 1,
                max_size: 10,
                priority: Priority::Medium,
            }],
            resources: ResourceLimits::default(),
            default_agent: AgentSpawnConfig::default(),
            autoscaling: AutoScalingConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            history_limit: 100,
            event_capacity: 1000,
            api_port: 8080,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            cpu_per_agent: 1.0,
            memory_per_agent: "2GB".to_string(),
        }
    }
}

impl Default for AutoScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scale_up_threshold: 0.85,
            scale_down_threshold: 0.30,
            scale_up_step: 2,
            scale_down_step: 1,
            cooldown_ms: 60_000,
        }
    }
}

impl AutoScalingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            timeout_ms: 15_000,
            max_retries: 3,
            retry_backoff_ms: 0,
            spawn_confirm_timeout_ms: 30_000,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.timeout_ms as i64)
    }

    pub fn spawn_confirm_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.spawn_confirm_timeout_ms as i64)
    }
}

impl FleetConfig {
    /// Loads a TOML or YAML file (by extension), applies `FLEET_*`
    /// environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: FleetConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?,
            _ => toml::from_str(&raw)
                .with_context(|| format!("Failed to parse TOML config {}", path.display()))?,
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("FLEET_ID") {
            self.fleet_id = id;
        }
        if let Some(max) = lookup("FLEET_MAX_AGENTS").and_then(|v| v.parse().ok()) {
            self.max_agents = max;
        }
        if let Some(mode) = lookup("FLEET_TOPOLOGY").and_then(|v| v.parse().ok()) {
            self.topology = mode;
        }
        if let Some(port) = lookup("FLEET_API_PORT").and_then(|v| v.parse().ok()) {
            self.api_port = port;
        }
        if let Some(enabled) = lookup("FLEET_AUTOSCALING_ENABLED").and_then(|v| v.parse().ok()) {
            self.autoscaling.enabled = enabled;
        }
        if let Some(ms) = lookup("FLEET_HEARTBEAT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.heartbeat.timeout_ms = ms;
        }
        if let Some(ms) = lookup("FLEET_HEARTBEAT_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.heartbeat.interval_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<(), FleetError> {
        let invalid = |msg: String| Err(FleetError::InvalidConfig(msg));

        if self.max_agents == 0 {
            return invalid("max_agents must be greater than zero".to_string());
        }

        let mut seen = HashSet::new();
        let mut total_min = 0;
        for pool in &self.pools {
            if pool.agent_type.trim().is_empty() {
                return invalid("pool agent_type must not be empty".to_string());
            }
            if !seen.insert(pool.agent_type.as_str()) {
                return invalid(format!("duplicate pool for agent type {}", pool.agent_type));
            }
            if pool.min_size > pool.max_size {
                return invalid(format!(
                    "pool {} has min_size {} > max_size {}",
                    pool.agent_type, pool.min_size, pool.max_size
                ));
            }
            total_min += pool.min_size;
        }
        if total_min > self.max_agents {
            return invalid(format!(
                "sum of pool min_size ({}) exceeds max_agents ({})",
                total_min, self.max_agents
            ));
        }

        if !is_valid_memory(&self.resources.memory_per_agent) {
            return invalid(format!(
                "resources.memory_per_agent '{}' must match <number>MB or <number>GB",
                self.resources.memory_per_agent
            ));
        }
        if !is_valid_memory(&self.default_agent.memory) {
            return invalid(format!(
                "default_agent.memory '{}' must match <number>MB or <number>GB",
                self.default_agent.memory
            ));
        }
        if self.resources.cpu_per_agent <= 0.0 || self.default_agent.cpu < 0.0 {
            return invalid("cpu limits must be positive".to_string());
        }

        let scaling = &self.autoscaling;
        if !(0.0..=1.0).contains(&scaling.scale_down_threshold)
            || !(0.0..=1.0).contains(&scaling.scale_up_threshold)
            || scaling.scale_down_threshold >= scaling.scale_up_threshold
        {
            return invalid(format!(
                "autoscaling thresholds must satisfy 0 <= down ({}) < up ({}) <= 1",
                scaling.scale_down_threshold, scaling.scale_up_threshold
            ));
        }

        if self.heartbeat.interval_ms == 0 || self.heartbeat.timeout_ms == 0 {
            return invalid("heartbeat interval and timeout must be non-zero".to_string());
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity must be non-zero".to_string());
        }

        Ok(())
    }

    pub fn pool(&self, agent_type: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| p.agent_type == agent_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = FleetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat.timeout_ms, 15_000);
        assert_eq!(config.autoscaling.cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
fleet_id = "qe-fleet"
max_agents = 50
topology = "mesh"

[[pools]]
agent_type = "executor"
min_size = 3
max_size = 15
priority = "critical"

[heartbeat]
timeout_ms = 20000
"#
        )
        .unwrap();

        let config = FleetConfig::load(file.path()).unwrap();

        assert_eq!(config.fleet_id, "qe-fleet");
        assert_eq!(config.topology, TopologyMode::Mesh);
        assert_eq!(config.pools.len(), 1);
        assert_eq!(config.pools[0].priority, Priority::Critical);
        assert_eq!(config.heartbeat.timeout_ms, 20_000);
        assert_eq!(config.heartbeat.max_retries, 3);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "max_agents: 10\npools:\n  - agent_type: analyzer\n    min_size: 1\n    max_size: 4\n"
        )
        .unwrap();

        let config = FleetConfig::load(file.path()).unwrap();

        assert_eq!(config.max_agents, 10);
        assert_eq!(config.pools[0].agent_type, "analyzer");
        assert_eq!(config.pools[0].priority, Priority::Medium);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLEET_MAX_AGENTS", "12"),
            ("FLEET_TOPOLOGY", "hybrid"),
            ("FLEET_HEARTBEAT_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = FleetConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_agents, 12);
        assert_eq!(config.topology, TopologyMode::Hybrid);
        assert_eq!(config.heartbeat.timeout_ms, 15_000);
    }

    #[test]
    fn test_validate_rejects_inverted_pool() {
        let mut config = FleetConfig::default();
        config.pools[0].min_size = 11;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_size 11 > max_size 10"));
    }

    #[test]
    fn test_validate_rejects_duplicate_pools() {
        let mut config = FleetConfig::default();
        config.pools.push(config.pools[0].clone());

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_memory() {
        let mut config = FleetConfig::default();
        config.resources.memory_per_agent = "2 gigs".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("memory_per_agent"));
    }

    #[test]
    fn test_validate_rejects_min_sum_over_fleet_max() {
        let mut config = FleetConfig::default();
        config.max_agents = 5;
        config.pools[0].min_size = 6;
        config.pools[0].max_size = 8;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = FleetConfig::default();
        config.autoscaling.scale_down_threshold = 0.9;

        assert!(config.validate().is_err());
    }
}
