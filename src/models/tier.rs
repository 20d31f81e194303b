use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Named timeout policy class applied to an execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Cheap, side-effect-light code
    Quick,
    /// Training, downloads and other slow work
    Long,
    /// Iterative workloads split into resumable batches
    Chunked,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Quick, Tier::Long, Tier::Chunked];

    /// Built-in policy used when the configuration table has no entry.
    pub fn default_policy(self) -> TierPolicy {
        match self {
            Tier::Quick => TierPolicy::from_secs(120),
            Tier::Long => TierPolicy::from_secs(600),
            // Applies to each batch, not the whole task
            Tier::Chunked => TierPolicy::from_secs(300),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Quick => write!(f, "quick"),
            Tier::Long => write!(f, "long"),
            Tier::Chunked => write!(f, "chunked"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Tier::Quick),
            "long" => Ok(Tier::Long),
            "chunked" => Ok(Tier::Chunked),
            _ => anyhow::bail!("Invalid tier: {s}. Valid values: quick, long, chunked"),
        }
    }
}

/// Timeout policy for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Execution budget handed to the remote runtime, in seconds
    pub timeout_secs: u64,
}

impl TierPolicy {
    pub fn from_secs(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dispatch table mapping each tier to its policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable(BTreeMap<Tier, TierPolicy>);

impl Default for TierTable {
    fn default() -> Self {
        Self(
            Tier::ALL
                .iter()
                .map(|tier| (*tier, tier.default_policy()))
                .collect(),
        )
    }
}

impl TierTable {
    pub fn policy(&self, tier: Tier) -> TierPolicy {
        self.0
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_policy())
    }

    pub fn set(&mut self, tier: Tier, policy: TierPolicy) {
        self.0.insert(tier, policy);
    }
}
