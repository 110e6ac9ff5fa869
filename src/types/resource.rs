use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::{AgentId, Priority};

pub const DEFAULT_MEMORY_MB: u64 = 512;

fn memory_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)(MB|GB)$").expect("memory pattern is valid"))
}

/// Normalizes a size string such as `512MB` or `2GB` to megabytes.
///
/// Anything that does not match `^(\d+)(MB|GB)$` falls back to 512MB, so
/// configuration must be validated with [`is_valid_memory`] upstream.
pub fn parse_memory_mb(value: &str) -> u64 {
    match try_parse_memory_mb(value) {
        Some(mb) => mb,
        None => {
            log::warn!(
                "Unrecognized memory size '{}', defaulting to {}MB",
                value,
                DEFAULT_MEMORY_MB
            );
            DEFAULT_MEMORY_MB
        }
    }
}

pub fn is_valid_memory(value: &str) -> bool {
    try_parse_memory_mb(value).is_some()
}

fn try_parse_memory_mb(value: &str) -> Option<u64> {
    let captures = memory_pattern().captures(value)?;
    let amount: u64 = captures[1].parse().ok()?;
    match &captures[2] {
        "GB" => amount.checked_mul(1024),
        _ => Some(amount),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAllocation {
    pub agent_id: AgentId,
    pub cpu: f64,
    /// Megabytes.
    pub memory: u64,
    pub priority: Priority,
    pub allocated: DateTime<Utc>,
}

impl ResourceAllocation {
    pub fn new(agent_id: AgentId, cpu: f64, memory: u64, priority: Priority) -> Self {
        Self {
            agent_id,
            cpu,
            memory,
            priority,
            allocated: Utc::now(),
        }
    }
}
