//! Environment prober
//!
//! One short call to `GET /probe`, turned into an [`EnvironmentSnapshot`] and a
//! [`Recommendation`] for tier and batch size. Remotes that leave memory out
//! of the probe payload are asked `GET /health` for it within the same
//! budget. A failed probe yields no snapshot at all.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::models::{EnvironmentSnapshot, Package, ProbeReport, Recommendation, Tier};
use crate::transport::wire::{HealthResponse, ProbeResponse};
use crate::transport::HttpTransport;

/// Thresholds behind the probe's recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeThresholds {
    /// Below this much free memory, batches are shrunk
    pub memory_floor_gb: f64,
    /// Below this much GPU memory, GPU-heavy work is discouraged
    pub gpu_memory_floor_gb: f64,
    pub base_batch_size: u64,
    pub reduced_batch_size: u64,
    /// Warn when the remote session has less than this many minutes left
    pub session_warning_minutes: f64,
    pub probe_timeout_secs: u64,
}

impl Default for ProbeThresholds {
    fn default() -> Self {
        Self {
            memory_floor_gb: 4.0,
            gpu_memory_floor_gb: 8.0,
            base_batch_size: 32,
            reduced_batch_size: 8,
            session_warning_minutes: 30.0,
            probe_timeout_secs: 30,
        }
    }
}

impl ProbeThresholds {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_batch_size == 0 || self.reduced_batch_size == 0 {
            return Err("probe batch sizes must be greater than zero".to_string());
        }
        if self.reduced_batch_size > self.base_batch_size {
            return Err(format!(
                "reduced_batch_size {} exceeds base_batch_size {}",
                self.reduced_batch_size, self.base_batch_size
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err("probe_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Derive a recommendation from a snapshot.
pub fn recommend(snapshot: &EnvironmentSnapshot, thresholds: &ProbeThresholds) -> Recommendation {
    let mut notes = Vec::new();
    let low_memory = snapshot.memory_available_gb < thresholds.memory_floor_gb;

    if low_memory {
        notes.push(format!(
            "Low memory ({:.1} GB available, floor {:.1} GB): sample datasets and use smaller batches",
            snapshot.memory_available_gb, thresholds.memory_floor_gb
        ));
    }
    if !snapshot.gpu_present {
        notes.push("No GPU: prefer CPU-friendly methods and avoid deep learning workloads".to_string());
    } else if snapshot.gpu_memory_gb < thresholds.gpu_memory_floor_gb {
        notes.push(format!(
            "Small GPU ({:.1} GB): keep models and batches modest",
            snapshot.gpu_memory_gb
        ));
    }
    if let Some(minutes) = snapshot.session_minutes_remaining {
        if minutes < thresholds.session_warning_minutes {
            notes.push(format!(
                "Session ends in about {minutes:.0} minutes: download results and checkpoint now"
            ));
        }
    }

    let (tier, batch_size) = if low_memory {
        (Tier::Quick, thresholds.reduced_batch_size)
    } else {
        (Tier::Long, thresholds.base_batch_size)
    };

    Recommendation {
        tier,
        batch_size,
        notes,
    }
}

pub struct EnvironmentProber<'a> {
    transport: &'a HttpTransport,
    thresholds: &'a ProbeThresholds,
}

impl<'a> EnvironmentProber<'a> {
    pub fn new(transport: &'a HttpTransport, thresholds: &'a ProbeThresholds) -> Self {
        Self {
            transport,
            thresholds,
        }
    }

    pub fn probe(&self) -> Result<ProbeReport, BridgeError> {
        let started = Instant::now();
        let budget = self.thresholds.probe_timeout();
        let response: ProbeResponse = self
            .transport
            .get_json("/probe", &[], budget)
            .map_err(|e| {
                warn!(error = %e, "probe failed");
                BridgeError::Probe {
                    reason: e.to_string(),
                }
            })?;

        let health_memory = match response.memory_available_gb() {
            Some(_) => None,
            None => self.health_memory(budget.saturating_sub(started.elapsed())),
        };
        let snapshot = snapshot_from(response, health_memory)?;
        let recommendation = recommend(&snapshot, self.thresholds);
        info!(
            memory_available_gb = snapshot.memory_available_gb,
            gpu = snapshot.gpu_present,
            tier = %recommendation.tier,
            batch_size = recommendation.batch_size,
            "probed remote environment"
        );
        Ok(ProbeReport {
            snapshot,
            recommendation,
        })
    }

    /// Free memory as reported by `/health`, if it answers in time.
    fn health_memory(&self, remaining: Duration) -> Option<f64> {
        if remaining.is_zero() {
            return None;
        }
        match self
            .transport
            .get_json::<HealthResponse>("/health", &[], remaining)
        {
            Ok(health) => health.memory_available_gb,
            Err(e) => {
                debug!(error = %e, "health lookup for probe memory failed");
                None
            }
        }
    }
}

/// Build a snapshot. Memory comes from the probe payload, else from
/// `fallback_memory_gb`; with neither the probe fails.
fn snapshot_from(
    response: ProbeResponse,
    fallback_memory_gb: Option<f64>,
) -> Result<EnvironmentSnapshot, BridgeError> {
    let memory_available_gb = response
        .memory_available_gb()
        .or(fallback_memory_gb)
        .ok_or_else(|| BridgeError::Probe {
            reason: "remote reported no memory_available_gb in /probe or /health".to_string(),
        })?;
    let memory_total_gb = response.memory_total_gb().unwrap_or(memory_available_gb);
    let gpu_present = response.gpu_present();
    let gpu_name = response.gpu_name();
    let gpu_memory_gb = response.gpu_memory_gb().unwrap_or(0.0);
    let session_minutes_remaining = response.session_minutes_remaining();

    let installed_packages = response
        .packages
        .into_parts()
        .into_iter()
        .map(|(name, version)| Package { name, version })
        .filter(|p| !p.name.is_empty())
        .collect();

    Ok(EnvironmentSnapshot {
        memory_total_gb,
        memory_available_gb,
        gpu_present,
        gpu_name,
        gpu_memory_gb,
        installed_packages,
        session_minutes_remaining,
        probed_at: Utc::now(),
    })
}
