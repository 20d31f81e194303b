use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::tier::Tier;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
}

/// Point-in-time facts about the remote runtime. Replaced on every probe,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub memory_total_gb: f64,
    pub memory_available_gb: f64,
    pub gpu_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_name: Option<String>,
    pub gpu_memory_gb: f64,
    pub installed_packages: BTreeSet<Package>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_minutes_remaining: Option<f64>,
    pub probed_at: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    pub fn package_version(&self, name: &str) -> Option<&str> {
        self.installed_packages
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.version.as_str())
    }
}

/// What the prober suggests for the next piece of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub tier: Tier,
    pub batch_size: u64,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub snapshot: EnvironmentSnapshot,
    pub recommendation: Recommendation,
}

/// Result of a health check. An unreachable remote is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_available_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}
