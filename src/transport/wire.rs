//! JSON bodies exchanged with the remote execution service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::CallError;
use crate::models::ExecutionResult;

#[derive(Debug, Serialize)]
pub struct ExecuteRequest<'a> {
    pub code: &'a str,
    /// Execution budget for the remote, in whole seconds
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_sec: Option<f64>,
    /// Whatever else the remote reports (memory, session info, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecuteResponse {
    /// Convert to a result. `budget` is the execution budget the remote was
    /// given; a failure that used all of it, or whose error names a timeout,
    /// is marked as timed out.
    pub fn into_result(self, elapsed: Duration, budget: Duration) -> ExecutionResult {
        let exhausted = self
            .execution_time_sec
            .is_some_and(|secs| secs >= budget.as_secs_f64());
        let mut state = self.extra;
        if let Some(secs) = self.execution_time_sec {
            state.insert("execution_time_sec".to_string(), Value::from(secs));
        }
        let remote_state = (!state.is_empty()).then(|| Value::Object(state).to_string());

        let error = if self.success {
            None
        } else {
            let message = self
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "remote reported failure without detail".to_string());
            if exhausted || names_timeout(&message) {
                Some(CallError::remote_timeout(200, message))
            } else {
                Some(CallError::remote(200, message))
            }
        };

        ExecutionResult {
            success: self.success,
            stdout: self.stdout,
            error,
            elapsed,
            remote_state,
        }
    }
}

fn names_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}

#[derive(Debug, Default, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub uptime_minutes: Option<f64>,
    #[serde(default)]
    pub memory_available_gb: Option<f64>,
    #[serde(default)]
    pub memory_used_pct: Option<f64>,
}

/// Package entry as reported by the remote: either `{name, version}` or a
/// `name==version` string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PackageEntry {
    Structured {
        name: String,
        #[serde(default)]
        version: String,
    },
    Pinned(String),
}

impl PackageEntry {
    pub fn into_parts(self) -> (String, String) {
        match self {
            PackageEntry::Structured { name, version } => (name, version),
            PackageEntry::Pinned(spec) => match spec.split_once("==") {
                Some((name, version)) => (name.trim().to_string(), version.trim().to_string()),
                None => (spec.trim().to_string(), String::new()),
            },
        }
    }
}

/// `packages` arrives as a list of entries or as a `{name: version}` map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PackageList {
    Entries(Vec<PackageEntry>),
    Versions(BTreeMap<String, Value>),
}

impl Default for PackageList {
    fn default() -> Self {
        PackageList::Entries(Vec::new())
    }
}

impl PackageList {
    /// `(name, version)` pairs. Packages reported as missing (`null`) are
    /// left out.
    pub fn into_parts(self) -> Vec<(String, String)> {
        match self {
            PackageList::Entries(entries) => {
                entries.into_iter().map(PackageEntry::into_parts).collect()
            }
            PackageList::Versions(map) => map
                .into_iter()
                .filter_map(|(name, version)| match version {
                    Value::Null | Value::Bool(false) => None,
                    Value::String(v) => Some((name, v)),
                    other => Some((name, other.to_string())),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ComputeSection {
    #[serde(default, alias = "memory_total_gb")]
    pub ram_total_gb: Option<f64>,
    #[serde(default, alias = "memory_available_gb")]
    pub ram_available_gb: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GpuSection {
    #[serde(default, alias = "present")]
    pub available: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "memory_gb", alias = "memory_total_gb")]
    pub memory: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitsSection {
    #[serde(default, alias = "session_minutes_remaining")]
    pub estimated_session_minutes_remaining: Option<f64>,
}

/// `GET /probe` body. Accepts the flat layout
/// (`{gpu_present, gpu_memory, packages}`) as well as the sectioned one
/// (`{compute: {ram_available_gb}, gpu: {available}, limits: {...}}`).
#[derive(Debug, Default, Deserialize)]
pub struct ProbeResponse {
    #[serde(default, alias = "ram_total_gb")]
    memory_total_gb: Option<f64>,
    #[serde(default, alias = "ram_available_gb")]
    memory_available_gb: Option<f64>,
    #[serde(default, alias = "gpu_available")]
    gpu_present: bool,
    #[serde(default)]
    gpu_name: Option<String>,
    #[serde(default, alias = "gpu_memory")]
    gpu_memory_gb: Option<f64>,
    #[serde(default, alias = "estimated_session_minutes_remaining")]
    session_minutes_remaining: Option<f64>,
    #[serde(default)]
    compute: Option<ComputeSection>,
    #[serde(default)]
    gpu: Option<GpuSection>,
    #[serde(default)]
    limits: Option<LimitsSection>,
    #[serde(default)]
    pub packages: PackageList,
}

impl ProbeResponse {
    pub fn memory_available_gb(&self) -> Option<f64> {
        self.memory_available_gb
            .or_else(|| self.compute.as_ref().and_then(|c| c.ram_available_gb))
    }

    pub fn memory_total_gb(&self) -> Option<f64> {
        self.memory_total_gb
            .or_else(|| self.compute.as_ref().and_then(|c| c.ram_total_gb))
    }

    pub fn gpu_present(&self) -> bool {
        self.gpu_present || self.gpu.as_ref().is_some_and(|g| g.available)
    }

    pub fn gpu_name(&self) -> Option<String> {
        self.gpu_name
            .clone()
            .or_else(|| self.gpu.as_ref().and_then(|g| g.name.clone()))
    }

    pub fn gpu_memory_gb(&self) -> Option<f64> {
        self.gpu_memory_gb
            .or_else(|| self.gpu.as_ref().and_then(|g| g.memory))
    }

    pub fn session_minutes_remaining(&self) -> Option<f64> {
        self.session_minutes_remaining.or_else(|| {
            self.limits
                .as_ref()
                .and_then(|l| l.estimated_session_minutes_remaining)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// `GET /files` answers with a bare list or with `{"files": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FileListing {
    Bare(Vec<RemoteFile>),
    Wrapped { files: Vec<RemoteFile> },
}

impl FileListing {
    pub fn into_files(self) -> Vec<RemoteFile> {
        match self {
            FileListing::Bare(files) | FileListing::Wrapped { files } => files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupResponse {
    #[serde(default, alias = "memory_freed_mb")]
    pub freed_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_cleared: Option<u64>,
}
